//! Fixed-size worker pool over independent external commands. Jobs write to
//! disjoint files (guaranteed by the partitioner), so the only coordination is
//! the completion barrier and first-failure propagation.
//!
//! Unlike the run-to-completion behavior this replaces, a failing job also
//! cancels siblings that have not started yet.

use crate::error::Result;
use crate::external::ExternalCommand;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Execute all commands on a pool of `min(concurrency, cores)` workers and
/// block until every one has terminated. The first non-zero exit is returned;
/// not-yet-started jobs are skipped once a failure is recorded. No ordering is
/// guaranteed among the jobs themselves.
pub fn run_all(commands: &[ExternalCommand], concurrency: usize) -> Result<()> {
    let workers = concurrency.max(1).min(num_cpus::get());
    debug!("START\tJobRunner\t{} jobs\t{} workers", commands.len(), workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| crate::error::PipelineError::Config(format!("worker pool: {}", e)))?;
    let failed = AtomicBool::new(false);
    pool.install(|| {
        commands.par_iter().try_for_each(|command| {
            if failed.load(Ordering::SeqCst) {
                debug!("JOB\tSKIP\t{}", command.render());
                return Ok(());
            }
            match command.run() {
                Ok(()) => Ok(()),
                Err(why) => {
                    failed.store(true, Ordering::SeqCst);
                    error!("JOB\tFAILED\t{}", command.render());
                    Err(why)
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn shell(script: &str) -> ExternalCommand {
        ExternalCommand::new("sh").args(["-c", script])
    }

    #[test]
    fn all_jobs_complete() {
        let dir = tempfile::tempdir().unwrap();
        let commands: Vec<_> = (0..8)
            .map(|i| {
                let out = dir.path().join(format!("job{}", i));
                shell(&format!("echo {} > {}", i, out.display()))
            })
            .collect();
        run_all(&commands, 4).unwrap();
        for i in 0..8 {
            assert!(dir.path().join(format!("job{}", i)).exists());
        }
    }

    #[test]
    fn first_failure_is_surfaced() {
        let commands = vec![shell("true"), shell("exit 7"), shell("true")];
        match run_all(&commands, 2) {
            Err(PipelineError::ToolFailure { status, command, .. }) => {
                assert_eq!(status, 7);
                assert!(command.contains("exit 7"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn empty_job_list_is_a_no_op() {
        run_all(&[], 4).unwrap();
    }

    #[test]
    fn concurrency_is_clamped() {
        // a pool request far beyond the core count must still work.
        let commands = vec![shell("true"); 3];
        run_all(&commands, 10_000).unwrap();
    }
}
