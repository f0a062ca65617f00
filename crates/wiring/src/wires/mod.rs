//! Input and output wires and the solder edges between them.

mod input;
mod output;
mod solder;

pub(crate) use input::WireBinding;
pub use input::InputWire;
pub use output::OutputWire;
pub use solder::SolderType;
