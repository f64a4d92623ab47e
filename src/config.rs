use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::ingest::MatchFilter;

/// Ball-by-ball cricket features, win probability and calibration
#[derive(Parser, Debug, Clone)]
#[command(name = "cricket-wp", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database that receives every match report (optional)
    #[arg(long, env = "DATABASE_PATH", global = true)]
    pub database_path: Option<String>,

    /// Process matches in parallel for `features` and `wp` (each match stays
    /// sequential internally)
    #[arg(long, env = "PARALLEL", default_value = "false", global = true)]
    pub parallel: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Flatten Cricsheet JSON match files into ball-by-ball CSV tables
    Flatten {
        /// A Cricsheet JSON file, a directory of them, or a Cricsheet .zip
        #[arg(long)]
        input: PathBuf,

        /// Where to write *_ball_by_ball.csv
        #[arg(long, default_value = "outputs")]
        outdir: PathBuf,

        /// Only keep the best match played on this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Only keep the best match between these teams, e.g. "India,Pakistan"
        #[arg(long, value_delimiter = ',')]
        teams: Vec<String>,

        /// Only keep the best match whose event name contains any of these
        #[arg(long, value_delimiter = ',')]
        event: Vec<String>,

        /// Output name of the selected match (defaults to the source file stem)
        #[arg(long)]
        name: Option<String>,
    },

    /// Build match-state features for every ball-by-ball table
    Features {
        /// Folder with *_ball_by_ball.csv tables
        #[arg(long, default_value = "outputs")]
        indir: PathBuf,

        /// Where to write *_features.csv
        #[arg(long, default_value = "outputs")]
        outdir: PathBuf,
    },

    /// Compute WP series, calibration, toy optimized WP and delta histograms
    Wp {
        /// Folder with *_ball_by_ball.csv tables
        #[arg(long, default_value = "outputs")]
        indir: PathBuf,

        /// Where to write enriched tables
        #[arg(long, default_value = "outputs/wp_outputs")]
        outdir: PathBuf,

        /// Number of calibration bins over [0, 1]
        #[arg(long, env = "CALIBRATION_BINS", default_value = "10")]
        bins: usize,

        /// Number of ΔWP histogram bins
        #[arg(long, env = "HIST_BINS", default_value = "20")]
        hist_bins: usize,
    },

    /// Print stored matches and the calibration pooled across all of them
    Summary {
        /// Number of calibration bins over [0, 1]
        #[arg(long, env = "CALIBRATION_BINS", default_value = "10")]
        bins: usize,

        /// Also print the stored calibration of this match
        #[arg(long)]
        key: Option<String>,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.command {
            Command::Flatten {
                input,
                teams,
                name,
                ..
            } => {
                if !input.exists() {
                    anyhow::bail!("input {} does not exist", input.display());
                }
                if teams.iter().filter(|t| !t.trim().is_empty()).count() == 1 {
                    anyhow::bail!("--teams needs both sides of the match");
                }
                if name.is_some() && self.match_filter().is_none() {
                    anyhow::bail!("--name only applies with --date, --teams or --event");
                }
            }
            Command::Features { indir, .. } => {
                if !indir.is_dir() {
                    anyhow::bail!("indir {} is not a directory", indir.display());
                }
            }
            Command::Wp {
                indir,
                bins,
                hist_bins,
                ..
            } => {
                if !indir.is_dir() {
                    anyhow::bail!("indir {} is not a directory", indir.display());
                }
                if *bins == 0 {
                    anyhow::bail!("bins must be at least 1");
                }
                if *hist_bins == 0 {
                    anyhow::bail!("hist_bins must be at least 1");
                }
            }
            Command::Summary { bins, .. } => {
                if self.database_path.is_none() {
                    anyhow::bail!("DATABASE_PATH is required for the summary command");
                }
                if *bins == 0 {
                    anyhow::bail!("bins must be at least 1");
                }
            }
        }
        Ok(())
    }

    /// Match-selection filter of the `flatten` command, if any was given.
    pub fn match_filter(&self) -> Option<MatchFilter> {
        match &self.command {
            Command::Flatten {
                date, teams, event, ..
            } => {
                let filter = MatchFilter::new(*date, teams, event);
                (!filter.is_empty()).then_some(filter)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("cricket-wp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn wp_defaults() {
        let cfg = parse(&["wp"]);
        assert!(!cfg.parallel);
        assert!(cfg.database_path.is_none());
        match cfg.command {
            Command::Wp {
                indir,
                outdir,
                bins,
                hist_bins,
            } => {
                assert_eq!(indir, PathBuf::from("outputs"));
                assert_eq!(outdir, PathBuf::from("outputs/wp_outputs"));
                assert_eq!(bins, 10);
                assert_eq!(hist_bins, 20);
            }
            other => panic!("Expected Wp, got {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cfg = parse(&["features", "--parallel", "--database-path", "wp.db"]);
        assert!(cfg.parallel);
        assert_eq!(cfg.database_path.as_deref(), Some("wp.db"));
    }

    #[test]
    fn zero_bins_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let indir = dir.path().to_str().unwrap();
        assert!(parse(&["wp", "--indir", indir]).validate().is_ok());
        assert!(parse(&["wp", "--indir", indir, "--bins", "0"]).validate().is_err());
        assert!(parse(&["wp", "--indir", indir, "--hist-bins", "0"]).validate().is_err());
    }

    #[test]
    fn summary_needs_database() {
        assert!(parse(&["summary"]).validate().is_err());
        assert!(parse(&["--database-path", "wp.db", "summary"]).validate().is_ok());
    }

    #[test]
    fn flatten_selection_flags() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().to_str().unwrap();

        let cfg = parse(&["flatten", "--input", input]);
        assert!(cfg.validate().is_ok());
        assert!(cfg.match_filter().is_none());

        let cfg = parse(&[
            "flatten",
            "--input",
            input,
            "--date",
            "2022-10-23",
            "--teams",
            "India,Pakistan Men",
            "--event",
            "world cup,t20 world cup",
            "--name",
            "IND_PAK_2022_T20WC",
        ]);
        assert!(cfg.validate().is_ok());
        let expected = MatchFilter::new(
            NaiveDate::from_ymd_opt(2022, 10, 23),
            &["india".to_string(), "pakistan".to_string()],
            &["World Cup".to_string(), "T20 World Cup".to_string()],
        );
        assert_eq!(cfg.match_filter(), Some(expected));
    }

    #[test]
    fn flatten_selection_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().to_str().unwrap();

        assert!(Config::try_parse_from(["cricket-wp", "flatten", "--input", input, "--date", "23/10/2022"]).is_err());
        assert!(parse(&["flatten", "--input", input, "--teams", "India"]).validate().is_err());
        assert!(parse(&["flatten", "--input", input, "--name", "x"]).validate().is_err());
    }

    #[test]
    fn missing_input_rejected() {
        let cfg = parse(&["flatten", "--input", "/definitely/not/here.json"]);
        assert!(cfg.validate().is_err());
    }
}
