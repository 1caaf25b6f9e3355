// Response bodies for the pairing HTTP surface

use serde::{Deserialize, Serialize};

/// Acknowledgement returned to the phone once its photo is in the relay slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadAck {
    pub status: String,
}

impl UploadAck {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}
