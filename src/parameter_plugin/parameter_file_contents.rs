use bevy_ecs::prelude::Resource;
use serde::de::DeserializeOwned;
use serde_yaml::Mapping;
use serde_yaml::Value;

use super::Parameters;
use super::ReadParametersError;

#[derive(Debug, Clone)]
pub struct Override {
    pub section: String,
    pub keys: Vec<String>,
    pub value: Value,
}

#[derive(Resource)]
pub struct ParameterFileContents {
    contents: String,
    overrides: Vec<Override>,
}

fn get_sub_value_by_keys<'a>(value: &'a mut Value, keys: &[String]) -> &'a mut Value {
    if keys.is_empty() {
        value
    } else {
        get_sub_value_by_keys(
            value
                .as_mapping_mut()
                .unwrap()
                .get_mut(&keys[0])
                .unwrap_or_else(|| {
                    panic!(
                        "Override key `{}` not found (remaining keys: {:?})",
                        &keys[0], &keys
                    )
                }),
            &keys[1..],
        )
    }
}

fn from_empty<T>() -> Result<T, ReadParametersError>
where
    T: Parameters + DeserializeOwned,
{
    serde_yaml::from_value::<T>(Value::Mapping(Mapping::default())).map_err(|_| {
        ReadParametersError(format!(
            "No section {} in parameter file. This section cannot be left out",
            T::unwrap_section_name()
        ))
    })
}

impl ParameterFileContents {
    pub fn new(contents: String) -> Self {
        Self {
            contents,
            overrides: vec![],
        }
    }

    pub fn with_overrides(&mut self, overrides: Vec<Override>) {
        self.overrides = overrides;
    }

    pub fn get_section_names(&self) -> Vec<String> {
        self.raw_value()
            .as_mapping()
            .unwrap_or(&Mapping::default())
            .keys()
            .map(|key| {
                key.as_str()
                    .expect("Non-string parameter section")
                    .to_owned()
            })
            .collect()
    }

    fn override_values(&self, value: &mut Value) {
        for o in self.overrides.iter() {
            let section = value
                .as_mapping_mut()
                .expect("Parameter file is not a mapping")
                .entry(Value::String(o.section.clone()))
                .or_insert(Value::Mapping(Mapping::default()));
            let sub_value = get_sub_value_by_keys(section, &o.keys);
            *sub_value = o.value.clone();
        }
    }

    fn raw_value(&self) -> Value {
        serde_yaml::from_str::<Value>(&self.contents).unwrap_or(Value::Null)
    }

    fn value(&self) -> Value {
        let value = serde_yaml::from_str::<Value>(&self.contents);
        match value {
            Ok(mut value) => {
                self.override_values(&mut value);
                value
            }
            Err(_) => {
                assert!(self.overrides.is_empty());
                Value::Null
            }
        }
    }

    pub fn extract_parameter_struct<T: Parameters + DeserializeOwned>(&self) -> T {
        let section = T::unwrap_section_name();
        match self.value() {
            Value::Mapping(mut mapping) => match mapping.remove(&Value::String(section.into())) {
                Some(value) => serde_yaml::from_value(value).unwrap_or_else(|err| {
                    panic!("Failed to read parameter section {}: {}", section, err)
                }),
                None => from_empty::<T>()
                    .unwrap_or_else(|err| panic!("Failed reading parameters: {}", err.0)),
            },
            _ => from_empty::<T>()
                .unwrap_or_else(|err| panic!("Failed reading parameters: {}", err.0)),
        }
    }
}
