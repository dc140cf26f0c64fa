//! Data structures backing the pending stores.

mod linked_slot_list;
pub use linked_slot_list::*;

mod ring_buffer;
pub use ring_buffer::*;
