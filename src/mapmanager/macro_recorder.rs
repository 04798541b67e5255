//! Macro record/replay (spec.md §4.H "Macros record the sequence of
//! (key, delay) tuples and replay them"), grounded on the original's
//! `macroSequence: Vec<(String, int)>` field on `Mapping`.

use std::time::Instant;

use crate::mapmanager::profile::MacroStep;

/// Captures key events as `(key, delay_since_previous_ms)` pairs while
/// recording is active.
#[derive(Default)]
pub struct MacroRecorder {
    steps: Vec<MacroStep>,
    last_event: Option<Instant>,
    recording: bool,
}

impl MacroRecorder {
    pub fn start(&mut self) {
        self.steps.clear();
        self.last_event = None;
        self.recording = true;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn record(&mut self, key_name: &str) {
        if !self.recording {
            return;
        }
        let now = Instant::now();
        let delay_ms = self.last_event.map(|t| now.duration_since(t).as_millis() as u64).unwrap_or(0);
        self.last_event = Some(now);
        self.steps.push(MacroStep {
            key: key_name.to_string(),
            delay_ms,
        });
    }

    /// Stop recording and hand back the captured sequence.
    pub fn finish(&mut self) -> Vec<MacroStep> {
        self.recording = false;
        std::mem::take(&mut self.steps)
    }
}

/// Replay a recorded sequence by calling `send` for each step, sleeping
/// the recorded delay beforehand. Runs on the calling thread; callers
/// needing non-blocking replay should spawn it themselves.
pub fn replay<F: FnMut(&str) -> anyhow::Result<()>>(steps: &[MacroStep], mut send: F) -> anyhow::Result<()> {
    for step in steps {
        if step.delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(step.delay_ms));
        }
        send(&step.key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_steps_with_increasing_delay() {
        let mut recorder = MacroRecorder::default();
        recorder.start();
        recorder.record("a");
        std::thread::sleep(std::time::Duration::from_millis(10));
        recorder.record("b");
        let steps = recorder.finish();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].delay_ms, 0);
        assert!(steps[1].delay_ms >= 8);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn replay_invokes_send_in_order() {
        let steps = vec![
            MacroStep { key: "a".into(), delay_ms: 0 },
            MacroStep { key: "b".into(), delay_ms: 1 },
        ];
        let mut seen = Vec::new();
        replay(&steps, |k| {
            seen.push(k.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }
}
