//! Local dial behaviour: the interaction state machine, its helpers, pointer
//! routing and the angle-to-value mapping. Nothing in here knows about the
//! network; authority is pushed in from outside.

pub mod angles;
pub mod control;
pub mod helper;
pub mod router;
pub mod snapper;
pub mod value_mapper;

pub use control::{AngleLimits, ControlEvent, DialControl, DialSettings};
pub use helper::{ControlHelper, HelperContext, HelperId, HelperRegistry};
pub use router::{InteractionRouter, PointerSample, RoutedInput};
pub use snapper::{DialPosition, Ease, PositionSnapper};
pub use value_mapper::{map_angle_to_value, DEFAULT_WRAP_ANGLE};
