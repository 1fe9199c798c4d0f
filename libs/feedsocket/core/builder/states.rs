/// Type-state markers for the builder pattern
///
/// These types track at compile time whether the frame handler has been set,
/// so `build()` only exists once it has.

/// Marker trait for handler state
pub trait HandlerState {}

/// Handler has not been set
pub struct NoHandler;
impl HandlerState for NoHandler {}

/// Handler has been set
pub struct HasHandler;
impl HandlerState for HasHandler {}
