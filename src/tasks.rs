// src/tasks.rs
use serde::Serialize;

pub const IDENTIFIED_OBJECTS: &str = "Identified Objects:";
pub const POTENTIAL_TASKS: &str = "Potential Tasks:";
pub const SAFETY_TIPS: &str = "Safety Tips:";
pub const NAVIGATION_ADVICE: &str = "Navigation Advice:";

/// Task guidance split out of the model's free-text answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskInsights {
    pub identified_objects: Vec<String>,
    pub potential_tasks: Vec<String>,
    pub safety_tips: Vec<String>,
    pub navigation_advice: Vec<String>,
    /// Unparsed model output, shown when no header was found.
    pub raw_response: String,
}

impl TaskInsights {
    /// Split `text` on the four section headers.
    ///
    /// A section runs from the first occurrence of its header to the next
    /// occurrence of the same header, and is cut at the first occurrence of
    /// the following header. Headers the model did not emit give empty lists.
    pub fn parse(text: &str) -> Self {
        Self {
            identified_objects: section(text, IDENTIFIED_OBJECTS, Some(POTENTIAL_TASKS)),
            potential_tasks: section(text, POTENTIAL_TASKS, Some(SAFETY_TIPS)),
            safety_tips: section(text, SAFETY_TIPS, Some(NAVIGATION_ADVICE)),
            navigation_advice: section(text, NAVIGATION_ADVICE, None),
            raw_response: text.to_string(),
        }
    }

    /// True when none of the headers produced any line.
    pub fn is_empty(&self) -> bool {
        self.sections().iter().all(|(_, lines)| lines.is_empty())
    }

    /// Display label and lines of each section, in display order.
    pub fn sections(&self) -> [(&'static str, &[String]); 4] {
        [
            ("Identified Objects", self.identified_objects.as_slice()),
            ("Potential Tasks", self.potential_tasks.as_slice()),
            ("Safety Tips", self.safety_tips.as_slice()),
            ("Navigation Advice", self.navigation_advice.as_slice()),
        ]
    }
}

fn section(text: &str, header: &str, next: Option<&str>) -> Vec<String> {
    let Some(after) = text.split(header).nth(1) else {
        return Vec::new();
    };
    let body = match next {
        Some(next) => after.split(next).next().unwrap_or(after),
        None => after,
    };
    body.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !is_decoration(line))
        .map(str::to_string)
        .collect()
}

/// Blank lines and markdown leftovers such as the `**` closing a bold header.
fn is_decoration(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '*' | '#' | '_' | '-' | '='))
}
