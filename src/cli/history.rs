//! History subcommand: print one project's audit trail.

use clap::Args;

/// Arguments for the history subcommand
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Project code, e.g. GMP-P1
    #[arg(value_name = "CODE")]
    pub code: String,

    /// Only show changes committed at or after this revision
    #[arg(long, value_name = "REVISION")]
    pub since: Option<u64>,
}

impl HistoryArgs {
    pub fn includes(&self, revision: u64) -> bool {
        self.since.is_none_or(|since| revision >= since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_filters_older_revisions() {
        let args = HistoryArgs {
            code: "GMP-P1".into(),
            since: Some(3),
        };
        assert!(!args.includes(2));
        assert!(args.includes(3));

        let all = HistoryArgs {
            code: "GMP-P1".into(),
            since: None,
        };
        assert!(all.includes(1));
    }
}
