use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use simplelog::ColorChoice;
use simplelog::Config;
use simplelog::TermLogger;
use simplelog::TerminalMode;

use crate::command_line_options::CommandLineOptions;
use crate::command_line_options::RestartFlag;
use crate::command_line_options::RestartOptions;
use crate::communication::BaseCommunicationPlugin;
use crate::parameter_plugin::parameter_file_contents::Override;
use crate::prelude::Simulation;
use crate::prelude::WorldRank;

pub struct SimulationBuilder {
    pub parameter_file_path: Option<PathBuf>,
    pub verbosity: usize,
    pub log: bool,
    pub parameter_overrides: Vec<Override>,
    pub restart_options: RestartOptions,
    base_communication: Option<BaseCommunicationPlugin>,
    require_parameter_file: bool,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self {
            parameter_file_path: None,
            verbosity: 0,
            log: true,
            parameter_overrides: vec![],
            restart_options: RestartOptions::default(),
            base_communication: None,
            require_parameter_file: false,
        }
    }
}

impl SimulationBuilder {
    pub fn new() -> Self {
        #[cfg(feature = "mpi")]
        {
            use crate::communication::Communicator;
            use crate::communication::SizedCommunicator;
            let world: Communicator<usize> = Communicator::new();
            Self {
                base_communication: Some(BaseCommunicationPlugin::new(
                    world.size(),
                    world.rank(),
                )),
                ..Default::default()
            }
        }
        #[cfg(not(feature = "mpi"))]
        {
            Self {
                base_communication: Some(BaseCommunicationPlugin::new(1, 0)),
                ..Default::default()
            }
        }
    }

    pub fn update_from_command_line_options(&mut self) -> &mut Self {
        self.with_command_line_options(&CommandLineOptions::parse())
    }

    pub fn with_command_line_options(&mut self, opts: &CommandLineOptions) -> &mut Self {
        if let Some(ref path) = opts.parameter_file_path {
            self.parameter_file_path(path);
        }
        self.verbosity(opts.verbosity);
        self.parameter_overrides = opts.parameter_overrides.clone();
        self.restart_options = RestartOptions {
            flag: RestartFlag::from_number(opts.restart_flag),
            snapshot: opts.snapshot_number,
        };
        self
    }

    pub fn parameters_from_relative_path(
        &mut self,
        file_path: &str,
        param_file_name: &str,
    ) -> &mut Self {
        self.parameter_file_path(
            &Path::new(file_path)
                .parent()
                .expect("Failed to get parent directory of source file")
                .join(param_file_name),
        )
    }

    pub fn parameter_file_path(&mut self, parameter_file_path: &Path) -> &mut Self {
        self.parameter_file_path = Some(parameter_file_path.to_owned());
        self
    }

    pub fn verbosity(&mut self, verbosity: usize) -> &mut Self {
        self.verbosity = verbosity;
        self
    }

    pub fn require_parameter_file(&mut self, require_parameter_file: bool) -> &mut Self {
        self.require_parameter_file = require_parameter_file;
        self
    }

    pub fn log(&mut self, log: bool) -> &mut Self {
        self.log = log;
        self
    }

    pub fn build_with_sim<'a>(&self, sim: &'a mut Simulation) -> &'a mut Simulation {
        if let Some(ref file) = self.parameter_file_path {
            sim.add_parameters_from_file(file);
        } else {
            if self.require_parameter_file {
                panic!("No parameter file given. Use the --parameter-file-path argument to pass one.");
            }
            sim.add_parameter_file_contents("{}".into());
        }
        sim.with_parameter_overrides(self.parameter_overrides.clone());
        sim.maybe_add_plugin(self.base_communication.clone());
        sim.insert_resource(self.restart_options);
        if self.log {
            let rank = **sim.unwrap_resource::<WorldRank>();
            self.log_setup(rank);
        }
        sim
    }

    pub fn build(&mut self) -> Simulation {
        let mut sim = Simulation::new();
        self.build_with_sim(&mut sim);
        sim
    }

    fn log_setup(&self, rank: i32) {
        // only the main rank logs to the terminal at full verbosity
        let level = if rank == 0 {
            match self.verbosity {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        } else {
            LevelFilter::Warn
        };
        // a second simulation in the same process keeps the first
        // logger
        let _ = TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        );
    }
}
