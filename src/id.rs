//! Code for handling IDs
use std::rc::Rc;

/// A unique identifier for a product
pub type ProductID = Rc<str>;

/// A unique identifier for a network node
pub type NodeID = Rc<str>;

/// Indicates that the struct has an ID field
pub trait HasID {
    /// Get a string representation of the struct's ID
    fn get_id(&self) -> &str;
}

/// Implement the `HasID` trait for the given type, assuming it has a field called `id`
macro_rules! define_id_getter {
    ($t:ty) => {
        impl crate::id::HasID for $t {
            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}
pub(crate) use define_id_getter;
