//! This library exists mainly because it is impossible/annoyingly hard
//! to create procedural macros that derive traits from the main crate.
//! This works fine for the main crate itself, but fails when
//! building examples. The problem is path/name resolution of the derived trait.
//! See https://github.com/rust-lang/rust/issues/54363

pub trait Named {
    fn name() -> &'static str;
}

/// A struct corresponding to one section of the parameter file.
/// Unnamed parameter structs are used as sub-entries of a named
/// section.
pub trait Parameters {
    fn section_name() -> Option<&'static str>;

    fn unwrap_section_name() -> &'static str {
        Self::section_name()
            .unwrap_or_else(|| panic!("Called unwrap_section_name on unnamed parameter struct."))
    }
}
