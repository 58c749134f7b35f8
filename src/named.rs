pub use derive_custom::Named;
pub use derive_traits::Named;

#[cfg(test)]
mod tests {
    use crate::named::Named;

    #[test]
    fn name_derive() {
        #[derive(Named)]
        #[name = "A"]
        struct A {
            _x: i32,
        }

        assert_eq!(A::name(), "A");
    }

    #[test]
    fn name_derive_more_attributes() {
        #[derive(Named)]
        #[repr(transparent)]
        #[name = "A"]
        struct A {
            _x: i32,
        }

        assert_eq!(A::name(), "A");
    }

    #[test]
    fn name_derive_implicitly() {
        #[derive(Named)]
        struct Foo {
            _x: i32,
        }

        assert_eq!(Foo::name(), "Foo");
    }
}
