//! Freshness tracking. Every stage asks whether its outputs must be
//! regenerated before doing any work, which is what makes a re-run after a
//! partial failure resume instead of recompute.

use crate::error::{PipelineError, Result};
use std::path::Path;
use std::time::SystemTime;

/// True when the outputs must be regenerated: forced, an output is missing, an
/// input is missing (fail toward recomputation, never toward skipping), or some
/// input is newer than some output.
pub fn is_stale<P: AsRef<Path>, Q: AsRef<Path>>(inputs: &[P], outputs: &[Q], force: bool) -> bool {
    if force {
        return true;
    }
    let mut newest_input = None;
    for input in inputs {
        match mtime(input.as_ref()) {
            Some(time) => newest_input = Some(newest_input.map_or(time, |t: SystemTime| t.max(time))),
            None => return true,
        }
    }
    let mut oldest_output = None;
    for output in outputs {
        match mtime(output.as_ref()) {
            Some(time) => {
                oldest_output = Some(oldest_output.map_or(time, |t: SystemTime| t.min(time)))
            }
            None => return true,
        }
    }
    match (newest_input, oldest_output) {
        (Some(input), Some(output)) => input > output,
        // No outputs declared means there is nothing to be stale against.
        (_, None) => false,
        (None, Some(_)) => false,
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Escalation used by callers for which a missing input is not "recompute" but
/// a broken predecessor stage.
pub fn require_inputs<P: AsRef<Path>>(stage: &'static str, inputs: &[P]) -> Result<()> {
    for input in inputs {
        if !input.as_ref().exists() {
            return Err(PipelineError::MissingArtifact {
                stage,
                path: input.as_ref().to_path_buf(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;

    fn touch(path: &PathBuf, content: &str) {
        let mut file = File::create(path).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn fresh_output_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        touch(&input, "a");
        std::thread::sleep(std::time::Duration::from_millis(20));
        touch(&output, "b");
        assert!(!is_stale(&[&input], &[&output], false));
    }

    #[test]
    fn newer_input_makes_output_stale() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        touch(&output, "b");
        std::thread::sleep(std::time::Duration::from_millis(20));
        touch(&input, "a");
        assert!(is_stale(&[&input], &[&output], false));
    }

    #[test]
    fn missing_output_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        touch(&input, "a");
        assert!(is_stale(&[&input], &[dir.path().join("nope")], false));
    }

    #[test]
    fn missing_input_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        touch(&output, "b");
        assert!(is_stale(&[dir.path().join("nope")], &[&output], false));
    }

    #[test]
    fn force_overrides_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        touch(&input, "a");
        std::thread::sleep(std::time::Duration::from_millis(20));
        touch(&output, "b");
        assert!(is_stale(&[&input], &[&output], true));
    }

    #[test]
    fn require_inputs_names_the_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        match require_inputs("join", &[&missing]) {
            Err(PipelineError::MissingArtifact { stage, path }) => {
                assert_eq!(stage, "join");
                assert_eq!(path, missing);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
