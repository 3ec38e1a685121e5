pub mod gestures;

pub use gestures::{GestureEvent, GestureInput};
