use super::*;

mod io_render;
mod prompt;
mod session;

pub(in crate::cli) use io_render::*;
pub(in crate::cli) use prompt::*;
pub(in crate::cli) use session::*;
