mod subkick_plugin;

use bevy_app::App;
use bevy_ecs::event::Event;
use bevy_ecs::prelude::Mut;
use bevy_ecs::prelude::Resource;
use bevy_ecs::prelude::World;
use bevy_ecs::schedule::IntoSystemDescriptor;
use bevy_ecs::schedule::StageLabel;
use log::debug;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use self::subkick_plugin::SubkickPlugin;
use crate::hash_map::HashSet;
use crate::named::Named;
use crate::parameter_plugin::ParameterFileContents;
use crate::parameter_plugin::ParameterPlugin;
use crate::parameter_plugin::Parameters;
use crate::communication::WorldRank;
use crate::stages::add_simulation_stages;

/// A thin wrapper around a bevy `App` that deduplicates plugins,
/// tracks parameter sections and knows about the rank it runs on.
#[derive(Default)]
pub struct Simulation {
    pub app: App,
    labels: HashSet<&'static str>,
    parameter_sections: HashSet<String>,
    stages_added: bool,
}

/// Set once the run should wind down; checked by the driver loop.
#[derive(Resource, Clone, Copy, Default)]
pub struct ShouldExit(pub bool);

impl Simulation {
    pub fn new() -> Self {
        let mut sim = Self::default();
        sim.add_stages();
        sim
    }

    #[cfg(test)]
    pub fn test() -> Self {
        use crate::command_line_options::RestartOptions;
        use crate::communication::BaseCommunicationPlugin;
        let mut sim = Self::new();
        sim.add_parameter_file_contents("{}".into());
        sim.add_plugin(BaseCommunicationPlugin::new(1, 0));
        sim.insert_resource(RestartOptions::default());
        sim
    }

    fn add_stages(&mut self) {
        if !self.stages_added {
            add_simulation_stages(&mut self.app);
            self.app.init_resource::<ShouldExit>();
            self.stages_added = true;
        }
    }

    pub fn already_added<P: Named>(&mut self) -> bool {
        !self.labels.insert(P::name())
    }

    pub fn add_plugin<T: Sync + Send + 'static + SubkickPlugin>(&mut self, plugin: T) -> &mut Self {
        self.add_stages();
        let already_added = self.already_added::<T>();
        if !already_added {
            plugin.build_always_once(self);
        }
        if !plugin.should_build(self) {
            debug!("Skip plugin: {}", T::name());
            return self;
        }
        debug!(" Add plugin: {}", T::name());
        if !plugin.allow_adding_twice() && already_added {
            panic!("Added twice: {}", T::name())
        }
        if !already_added {
            plugin.build_once_everywhere(self);
            if !self.has_world_rank() {
            } else if self.on_main_rank() {
                plugin.build_once_on_main_rank(self);
            } else {
                plugin.build_once_on_other_ranks(self);
            }
        }
        plugin.build_everywhere(self);
        if !self.has_world_rank() {
        } else if self.on_main_rank() {
            plugin.build_on_main_rank(self);
        } else {
            plugin.build_on_other_ranks(self);
        }
        self
    }

    pub fn maybe_add_plugin<T: Sync + Send + 'static + SubkickPlugin>(
        &mut self,
        plugin: Option<T>,
    ) -> &mut Self {
        if let Some(plugin) = plugin {
            self.add_plugin(plugin);
        }
        self
    }

    pub fn add_system<Params>(&mut self, system: impl IntoSystemDescriptor<Params>) -> &mut Self {
        self.app.add_system(system);
        self
    }

    pub fn add_system_to_stage<Params>(
        &mut self,
        stage_label: impl StageLabel,
        system: impl IntoSystemDescriptor<Params>,
    ) -> &mut Self {
        self.app.add_system_to_stage(stage_label, system);
        self
    }

    pub fn add_startup_system<Params>(
        &mut self,
        system: impl IntoSystemDescriptor<Params>,
    ) -> &mut Self {
        self.app.add_startup_system(system);
        self
    }

    pub fn add_startup_system_to_stage<Params>(
        &mut self,
        stage_label: impl StageLabel,
        system: impl IntoSystemDescriptor<Params>,
    ) -> &mut Self {
        self.app.add_startup_system_to_stage(stage_label, system);
        self
    }

    pub fn add_event<T>(&mut self) -> &mut Self
    where
        T: Event,
    {
        self.app.add_event::<T>();
        self
    }

    pub fn insert_resource<R: Resource>(&mut self, resource: R) -> &mut Self {
        self.app.insert_resource(resource);
        self
    }

    pub fn insert_non_send_resource<R: 'static>(&mut self, resource: R) -> &mut Self {
        self.app.insert_non_send_resource(resource);
        self
    }

    pub fn get_resource<T: Resource>(&self) -> Option<&T> {
        self.app.world.get_resource::<T>()
    }

    pub fn get_resource_mut<T: Resource>(&mut self) -> Option<Mut<T>> {
        self.app.world.get_resource_mut::<T>()
    }

    pub fn unwrap_resource<T: Resource>(&self) -> &T {
        self.app.world.get_resource::<T>().unwrap()
    }

    pub fn unwrap_resource_mut<T: Resource>(&mut self) -> Mut<T> {
        self.app.world.get_resource_mut::<T>().unwrap()
    }

    pub fn contains_resource<T: Resource>(&self) -> bool {
        self.get_resource::<T>().is_some()
    }

    pub fn world(&mut self) -> &mut World {
        &mut self.app.world
    }

    fn has_world_rank(&self) -> bool {
        if !self.contains_resource::<WorldRank>() {
            warn!("World rank not present during plugin initialization, this should only happen in tests");
            false
        } else {
            true
        }
    }

    pub fn on_main_rank(&self) -> bool {
        self.unwrap_resource::<WorldRank>().is_main()
    }

    pub fn add_parameter_type<T>(&mut self) -> &mut Self
    where
        T: Parameters + Serialize + DeserializeOwned + Resource,
    {
        self.parameter_sections
            .insert(T::unwrap_section_name().into());
        self.add_plugin(ParameterPlugin::<T>::default());
        self
    }

    pub fn add_parameter_type_and_get_result<T>(&mut self) -> &T
    where
        T: Parameters + Serialize + DeserializeOwned + Resource,
    {
        self.add_parameter_type::<T>();
        self.unwrap_resource::<T>()
    }

    /// Inserts the parameters directly, which allows tests to run
    /// without a parameter file.
    pub fn add_parameters_explicitly<T: Parameters + Resource>(
        &mut self,
        parameters: T,
    ) -> &mut Self {
        if let Some(name) = T::section_name() {
            self.parameter_sections.insert(name.into());
        }
        self.insert_resource(parameters);
        self
    }

    pub fn add_parameter_file_contents(&mut self, contents: String) -> &mut Self {
        self.insert_resource(ParameterFileContents::new(contents));
        self
    }

    /// Warn about parameter file sections that no registered plugin
    /// has claimed; almost always a typo in the file.
    pub fn validate(&self) {
        if let Some(contents) = self.get_resource::<ParameterFileContents>() {
            for section in contents.get_section_names() {
                if !self.parameter_sections.contains(&section) {
                    warn!("Unused parameter section: {}", section);
                }
            }
        }
    }

    pub fn run(&mut self) {
        self.run_without_finalize();
        Self::finalize();
    }

    pub fn finalize() {
        #[cfg(feature = "mpi")]
        crate::communication::MPI_UNIVERSE.drop();
    }

    /// Runs the simulation without calling MPI_FINALIZE. This should
    /// only be used for tests and other cases where multiple
    /// simulations run in one process. Make sure to call finalize()
    /// explicitly after the last run.
    pub fn run_without_finalize(&mut self) {
        if self.contains_resource::<ParameterFileContents>() {
            self.validate();
        }
        loop {
            self.app.update();
            if self.unwrap_resource::<ShouldExit>().0 {
                break;
            }
        }
    }

    pub fn update(&mut self) {
        self.app.update()
    }

    /// Advances the simulation by whole steps until the integer
    /// clock sits on a sync point again.
    #[cfg(test)]
    pub fn run_to_sync_point(&mut self) {
        use crate::timeline::Timeline;
        loop {
            self.app.update();
            if self.unwrap_resource::<ShouldExit>().0 {
                break;
            }
            let timeline = self.unwrap_resource::<Timeline>();
            if timeline.on_sync_point() {
                break;
            }
        }
    }
}
