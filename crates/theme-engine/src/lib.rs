pub mod theme;
pub mod util;

pub use theme::{
    ThemeEngine,
    ThemeEngineHandle,
};
