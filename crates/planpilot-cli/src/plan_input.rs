//! Shared CLI arguments describing where the plan files live.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use planpilot_core::plan::PlanSource;

/// Plan input: either one unified file or the three split-layout files.
#[derive(Debug, Args)]
pub struct PlanInputArgs {
    /// Unified plan file where every item declares its type
    #[arg(long, value_name = "FILE", conflicts_with_all = ["epics", "stories", "tasks"])]
    pub plan: Option<PathBuf>,

    /// Epics file of a split layout
    #[arg(long, value_name = "FILE")]
    pub epics: Option<PathBuf>,

    /// Stories file of a split layout
    #[arg(long, value_name = "FILE")]
    pub stories: Option<PathBuf>,

    /// Tasks file of a split layout
    #[arg(long, value_name = "FILE")]
    pub tasks: Option<PathBuf>,
}

impl PlanInputArgs {
    /// Turn the parsed flags into a [`PlanSource`].
    ///
    /// The split layout needs all three files; a partial triple is
    /// rejected here rather than by clap so the message can name the
    /// full set.
    pub fn to_source(&self) -> Result<PlanSource> {
        if let Some(ref path) = self.plan {
            return Ok(PlanSource::Unified { path: path.clone() });
        }
        match (&self.epics, &self.stories, &self.tasks) {
            (Some(epics), Some(stories), Some(tasks)) => Ok(PlanSource::Split {
                epics: epics.clone(),
                stories: stories.clone(),
                tasks: tasks.clone(),
            }),
            _ => bail!("provide either --plan or all of --epics/--stories/--tasks"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(
        plan: Option<&str>,
        epics: Option<&str>,
        stories: Option<&str>,
        tasks: Option<&str>,
    ) -> PlanInputArgs {
        PlanInputArgs {
            plan: plan.map(PathBuf::from),
            epics: epics.map(PathBuf::from),
            stories: stories.map(PathBuf::from),
            tasks: tasks.map(PathBuf::from),
        }
    }

    #[test]
    fn unified_flag_produces_unified_source() {
        let source = args(Some("plan.toml"), None, None, None).to_source().unwrap();
        assert!(matches!(source, PlanSource::Unified { .. }));
    }

    #[test]
    fn three_split_flags_produce_split_source() {
        let source = args(None, Some("e.toml"), Some("s.toml"), Some("t.toml"))
            .to_source()
            .unwrap();
        assert!(matches!(source, PlanSource::Split { .. }));
    }

    #[test]
    fn no_flags_is_an_error() {
        let err = args(None, None, None, None).to_source().unwrap_err();
        assert!(err.to_string().contains("--plan"), "unexpected: {err}");
    }

    #[test]
    fn incomplete_split_is_an_error() {
        let err = args(None, Some("e.toml"), None, Some("t.toml"))
            .to_source()
            .unwrap_err();
        assert!(err.to_string().contains("--epics"), "unexpected: {err}");
    }
}
