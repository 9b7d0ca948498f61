//! Client core for the crop disease prediction front-end: the
//! upload-and-predict controller and the collaborators it talks to.

pub mod config;
pub mod controller;
pub mod endpoint;
pub mod file;
pub mod preferences;
pub mod preview;

pub use controller::{
    ControllerEvent, ControllerOptions, ControllerSnapshot, SelectionSnapshot,
    UploadPredictionController,
};
pub use endpoint::{HttpPredictionEndpoint, PredictionEndpoint};
pub use file::{ImageFile, SelectPathError};
pub use preferences::{MemoryPreferenceStore, PreferenceStore, DISPLAY_PREFERENCE_KEY};
pub use preview::{PreviewHandle, PreviewRegistry};

#[cfg(test)]
#[path = "tests/endpoint_tests.rs"]
mod endpoint_tests;
