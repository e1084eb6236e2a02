mod cancel;

pub mod prelude {
    pub use crate::cancel::{CancelHandle, CancelListener};
}
