use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bevy_ecs::prelude::Resource;
use clap::Parser;

use crate::endrun;
use crate::parameter_plugin::parameter_file_contents::Override;

#[derive(Debug)]
pub struct ParseParameterOverrideError(String);

impl fmt::Display for ParseParameterOverrideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Error for ParseParameterOverrideError {
    #[allow(deprecated)]
    fn description(&self) -> &str {
        "failed to parse parameter override"
    }
}

impl FromStr for Override {
    type Err = ParseParameterOverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split: Vec<_> = s.split(':').collect();
        if split.len() != 2 {
            return Err(ParseParameterOverrideError(format!(
                "Expected key and value separated by `:`, found `{s}`",
            )));
        }
        let mut keys: Vec<String> = split[0].split('/').map(|x| x.to_owned()).collect();
        let section = keys.remove(0);
        let value = serde_yaml::from_str(split[1]).unwrap_or_else(|e| panic!("Failed to parse parameter value in command line argument. keys: {:?} value: {}\n{}", &keys, &split[1], e));
        Ok(Override {
            section,
            keys,
            value,
        })
    }
}

/// What state the run starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartFlag {
    FreshIc,
    SnapshotResume,
    SnapshotResumeAt,
    FofOnly,
    ConvertSnapshot,
}

impl RestartFlag {
    pub fn from_number(flag: u8) -> Self {
        match flag {
            0 => RestartFlag::FreshIc,
            1 => RestartFlag::SnapshotResume,
            2 => RestartFlag::SnapshotResumeAt,
            3 => RestartFlag::FofOnly,
            4 => RestartFlag::ConvertSnapshot,
            _ => endrun!(0, "Unknown restart flag: {}", flag),
        }
    }
}

#[derive(Resource, Clone, Copy, Debug)]
pub struct RestartOptions {
    pub flag: RestartFlag,
    pub snapshot: Option<i64>,
}

impl Default for RestartOptions {
    fn default() -> Self {
        Self {
            flag: RestartFlag::FreshIc,
            snapshot: None,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CommandLineOptions {
    pub parameter_overrides: Vec<Override>,
    #[clap(long)]
    pub parameter_file_path: Option<PathBuf>,
    #[clap(short, parse(from_occurrences))]
    pub verbosity: usize,
    /// 0: fresh ICs, 1: resume from the latest snapshot, 2: resume
    /// from a numbered snapshot, 3: FOF only, 4: convert a snapshot.
    #[clap(long, default_value_t = 0)]
    pub restart_flag: u8,
    #[clap(long)]
    pub snapshot_number: Option<i64>,
}
