// src/speech.rs
use log::{debug, info, warn};
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use crate::config::{Settings, DEFAULT_SPEECH_RATE};
use crate::error::{AssistError, Result};

/// Speaks text aloud. Returns once playback has finished.
pub trait SpeechEngine: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
enum TextInput {
    Stdin,
    /// Appended as the last argument
    Arg,
}

/// One way of invoking a speech synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechCommand {
    program: String,
    args: Vec<String>,
    input: TextInput,
}

impl SpeechCommand {
    pub fn stdin(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            input: TextInput::Stdin,
        }
    }

    pub fn arg(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
            input: TextInput::Arg,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Ok(None) when the program is not installed.
    fn run(&self, text: &str) -> Result<Option<()>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        match self.input {
            TextInput::Stdin => {
                command.stdin(Stdio::piped());
            }
            TextInput::Arg => {
                command.arg(text).stdin(Stdio::null());
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.input == TextInput::Stdin {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(text.as_bytes()) {
                    if e.kind() != ErrorKind::BrokenPipe {
                        return Err(e.into());
                    }
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(AssistError::ToolFailed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(Some(()))
    }
}

/// Speaks through the first installed platform synthesizer.
pub struct SystemSpeaker {
    commands: Vec<SpeechCommand>,
}

impl SystemSpeaker {
    pub fn new(rate: u32, voice: Option<&str>) -> Self {
        Self::with_commands(platform_commands(rate, voice))
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.speech_rate, settings.speech_voice.as_deref())
    }

    pub fn with_commands(commands: Vec<SpeechCommand>) -> Self {
        Self { commands }
    }

    /// The synthesizer `speak` would use, looked up on PATH.
    pub fn installed_engine(&self) -> Option<&str> {
        self.commands
            .iter()
            .map(|c| c.program())
            .find(|program| which::which(program).is_ok())
    }
}

impl Default for SystemSpeaker {
    fn default() -> Self {
        Self::new(DEFAULT_SPEECH_RATE, None)
    }
}

impl SpeechEngine for SystemSpeaker {
    fn speak(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            warn!("Nothing to speak");
            return Ok(());
        }

        for command in &self.commands {
            debug!("Trying speech engine: {}", command.program());
            if command.run(text)?.is_some() {
                info!("Spoke {} characters with {}", text.len(), command.program());
                return Ok(());
            }
        }

        let tried: Vec<&str> = self.commands.iter().map(|c| c.program()).collect();
        Err(AssistError::ToolMissing(tried.join(", ")))
    }
}

fn platform_commands(rate: u32, voice: Option<&str>) -> Vec<SpeechCommand> {
    if cfg!(target_os = "windows") {
        windows_commands(rate, voice)
    } else if cfg!(target_os = "macos") {
        macos_commands(rate, voice)
    } else {
        linux_commands(rate, voice)
    }
}

fn linux_commands(rate: u32, voice: Option<&str>) -> Vec<SpeechCommand> {
    let espeak_args = |voice: Option<&str>| {
        let mut args = vec!["--stdin".to_string(), "-s".to_string(), rate.to_string()];
        if let Some(voice) = voice {
            args.push("-v".to_string());
            args.push(voice.to_string());
        }
        args
    };

    // spd-say takes a relative rate in -100..=100 around its default.
    let relative = ((rate as i64 - DEFAULT_SPEECH_RATE as i64) / 2).clamp(-100, 100);
    let mut spd_args = vec!["-w".to_string(), "-r".to_string(), relative.to_string()];
    if let Some(voice) = voice {
        spd_args.push("-y".to_string());
        spd_args.push(voice.to_string());
    }

    vec![
        SpeechCommand::stdin("espeak-ng", espeak_args(voice)),
        SpeechCommand::stdin("espeak", espeak_args(voice)),
        SpeechCommand::arg("spd-say", spd_args),
    ]
}

fn macos_commands(rate: u32, voice: Option<&str>) -> Vec<SpeechCommand> {
    let mut args = vec!["-r".to_string(), rate.to_string()];
    if let Some(voice) = voice {
        args.push("-v".to_string());
        args.push(voice.to_string());
    }
    args.push("-f".to_string());
    args.push("-".to_string());
    vec![SpeechCommand::stdin("say", args)]
}

fn windows_commands(rate: u32, voice: Option<&str>) -> Vec<SpeechCommand> {
    // SAPI rate is -10..=10 with 0 as the default speed.
    let sapi_rate = ((rate as i64 - DEFAULT_SPEECH_RATE as i64) / 20).clamp(-10, 10);
    let mut script = format!(
        "Add-Type -AssemblyName System.Speech; \
         $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
         $s.Rate = {}; ",
        sapi_rate
    );
    if let Some(voice) = voice {
        script.push_str(&format!("$s.SelectVoice('{}'); ", voice.replace('\'', "''")));
    }
    script.push_str("$s.Speak([Console]::In.ReadToEnd())");

    vec![SpeechCommand::stdin(
        "powershell",
        vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            script,
        ],
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_a_no_op() {
        let speaker = SystemSpeaker::with_commands(vec![SpeechCommand::stdin("no-such-speaker", vec![])]);
        assert!(speaker.speak("   \n").is_ok());
    }

    #[test]
    fn reports_every_missing_engine() {
        let speaker = SystemSpeaker::with_commands(vec![
            SpeechCommand::stdin("no-such-speaker-a", vec![]),
            SpeechCommand::arg("no-such-speaker-b", vec![]),
        ]);
        match speaker.speak("hello") {
            Err(AssistError::ToolMissing(tried)) => {
                assert_eq!(tried, "no-such-speaker-a, no-such-speaker-b")
            }
            other => panic!("expected ToolMissing, got {:?}", other),
        }
        assert_eq!(speaker.installed_engine(), None);
    }

    #[cfg(unix)]
    #[test]
    fn falls_through_to_first_installed_engine() {
        // `cat` drains stdin and exits cleanly, standing in for a synthesizer.
        let speaker = SystemSpeaker::with_commands(vec![
            SpeechCommand::stdin("no-such-speaker", vec![]),
            SpeechCommand::stdin("cat", vec![]),
        ]);
        assert!(speaker.speak("The kettle is on the left.").is_ok());
        assert_eq!(speaker.installed_engine(), Some("cat"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_engine_is_an_error() {
        let speaker = SystemSpeaker::with_commands(vec![SpeechCommand::arg("false", vec![])]);
        assert!(matches!(
            speaker.speak("hello"),
            Err(AssistError::ToolFailed { .. })
        ));
    }

    #[test]
    fn linux_prefers_espeak_ng_and_maps_rate() {
        let commands = linux_commands(150, Some("en-us"));
        let programs: Vec<&str> = commands.iter().map(|c| c.program()).collect();
        assert_eq!(programs, vec!["espeak-ng", "espeak", "spd-say"]);
        assert_eq!(commands[0].args, vec!["--stdin", "-s", "150", "-v", "en-us"]);
        assert_eq!(commands[2].args, vec!["-w", "-r", "-25", "-y", "en-us"]);
        assert_eq!(commands[2].input, TextInput::Arg);
    }

    #[test]
    fn macos_reads_text_from_stdin() {
        let commands = macos_commands(200, None);
        assert_eq!(commands[0].args, vec!["-r", "200", "-f", "-"]);
    }

    #[test]
    fn windows_script_escapes_voice_and_clamps_rate() {
        let commands = windows_commands(1000, Some("Microsoft Zira's Voice"));
        let script = commands[0].args.last().unwrap();
        assert!(script.contains("$s.Rate = 10;"));
        assert!(script.contains("SelectVoice('Microsoft Zira''s Voice')"));
        assert!(script.ends_with("$s.Speak([Console]::In.ReadToEnd())"));
    }
}
