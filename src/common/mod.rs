pub mod paths;
pub mod progress;
pub mod shell;

pub use progress::{create_spinner, finish_spinner_with_success};
