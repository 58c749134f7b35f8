pub mod parameter_file_contents;

use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use bevy_ecs::prelude::Resource;
pub use derive_traits::Parameters;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

use self::parameter_file_contents::Override;
pub use self::parameter_file_contents::ParameterFileContents;
use crate::named::Named;
use crate::simulation::SubkickPlugin;
use crate::simulation::Simulation;

pub struct ReadParametersError(pub String);

impl Simulation {
    pub fn add_parameters_from_file(&mut self, parameter_file_name: &Path) -> &mut Self {
        let contents = fs::read_to_string(parameter_file_name).unwrap_or_else(|_| {
            panic!(
                "Failed to read parameter file at {:?}",
                &parameter_file_name
            )
        });
        self.add_parameter_file_contents(contents)
    }

    pub fn with_parameter_overrides(&mut self, overrides: Vec<Override>) -> &mut Self {
        self.get_resource_mut::<ParameterFileContents>()
            .unwrap()
            .with_overrides(overrides);
        self
    }
}

pub struct ParameterPlugin<T> {
    _marker: PhantomData<T>,
}

impl<T> Named for ParameterPlugin<T> {
    fn name() -> &'static str {
        "parameter_plugin"
    }
}

impl<T> Default for ParameterPlugin<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> SubkickPlugin for ParameterPlugin<T>
where
    T: Parameters + Serialize + DeserializeOwned + Resource,
{
    fn allow_adding_twice(&self) -> bool {
        true
    }

    fn should_build(&self, sim: &Simulation) -> bool {
        // In tests, we want to be able to insert the parameters
        // directly into the sim, without having to read a parameter
        // file, which is why we only add the plugin if the parameter
        // struct isn't already present.
        if sim.contains_resource::<T>() {
            debug!("Parameters for {:?} already present", T::section_name());
            false
        } else {
            true
        }
    }

    fn build_everywhere(&self, sim: &mut Simulation) {
        let parameter_file_contents = sim.get_resource::<ParameterFileContents>().unwrap_or_else(|| panic!("No parameter file contents resource available while reading parameters for {:?} - failed to call add_parameters_from_file?", T::section_name()));
        let parameters: T = parameter_file_contents.extract_parameter_struct();
        sim.insert_resource(parameters);
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde::Serialize;

    use crate::named::Named;
    use crate::parameter_plugin::ParameterPlugin;
    use crate::simulation::Simulation;

    #[derive(
        Clone, Serialize, Deserialize, Default, Named, bevy_ecs::prelude::Resource,
    )]
    #[name = "parameters1"]
    struct Parameters1 {
        i: i32,
    }

    impl derive_traits::Parameters for Parameters1 {
        fn section_name() -> Option<&'static str> {
            Some("parameters1")
        }
    }

    #[derive(Serialize, Deserialize, Default, Named, bevy_ecs::prelude::Resource)]
    #[name = "parameters2"]
    struct Parameters2 {
        s: String,
        #[serde(default)]
        d: String,
    }

    impl derive_traits::Parameters for Parameters2 {
        fn section_name() -> Option<&'static str> {
            Some("parameters2")
        }
    }

    #[test]
    fn parameter_plugin() {
        let mut sim = Simulation::new();
        sim.add_parameter_file_contents(
            "
parameters1:
  i:
    1
parameters2:
  s:
   'hi'"
                .into(),
        );
        let params1 = sim
            .add_parameter_type_and_get_result::<Parameters1>()
            .clone();
        sim.add_parameter_type::<Parameters2>();
        let params2 = sim.unwrap_resource::<Parameters2>();
        assert_eq!(params1.i, 1);
        assert_eq!(params2.s, "hi");
        assert_eq!(params2.d, "");
    }

    #[test]
    #[should_panic]
    fn do_not_accept_missing_required_parameter_section() {
        #[derive(Serialize, Deserialize, Named, bevy_ecs::prelude::Resource)]
        #[name = "parameters3"]
        struct Parameters3 {
            _i: i32,
        }

        impl derive_traits::Parameters for Parameters3 {
            fn section_name() -> Option<&'static str> {
                Some("parameters3")
            }
        }

        let mut sim = Simulation::new();
        sim.add_parameter_file_contents("".into());
        sim.add_plugin(ParameterPlugin::<Parameters3>::default());
    }
}
