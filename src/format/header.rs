//! Session header ("basic info") line anchoring each log file.

#![allow(missing_docs)]

use crate::format::line::{LogFormatter, Payload};
use crate::platform::pal::HostInfo;

/// Tag of every header line.
pub const HEADER_TAG: &str = "basic";

/// Constant placeholder occupying the fourth header field.
pub const HEADER_PLACEHOLDER: &str = "~";

/// One snapshot of the header fields, in on-disk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicInfoRecord {
    pub platform: String,
    pub process_name: String,
    pub app_version: String,
    pub user_info: String,
    pub device_id: String,
    pub device_info: String,
    pub rooted: bool,
}

impl BasicInfoRecord {
    /// Collect the current host metadata plus session identity.
    pub fn collect(host: &dyn HostInfo, user_info: &str, device_id: &str) -> Self {
        Self {
            platform: host.platform_label(),
            process_name: host.process_name(),
            app_version: host.app_version(),
            user_info: user_info.to_string(),
            device_id: device_id.to_string(),
            device_info: host.device_info(),
            rooted: host.is_rooted(),
        }
    }

    /// Fields in fixed order; the root flag is `0`/`1`.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        vec![
            self.platform.clone(),
            self.process_name.clone(),
            self.app_version.clone(),
            HEADER_PLACEHOLDER.to_string(),
            self.user_info.clone(),
            self.device_id.clone(),
            self.device_info.clone(),
            if self.rooted { "1" } else { "0" }.to_string(),
        ]
    }

    /// Header as a complete log line.
    #[must_use]
    pub fn render(&self, formatter: &LogFormatter) -> String {
        formatter.format(HEADER_TAG, &Payload::Fields(self.fields()), false)
    }

    /// Rebuild a record from the fields of a parsed header line.
    #[must_use]
    pub fn from_fields(fields: &[String]) -> Option<Self> {
        let [platform, process_name, app_version, placeholder, user_info, device_id, device_info, rooted] =
            fields
        else {
            return None;
        };
        if placeholder != HEADER_PLACEHOLDER {
            return None;
        }
        let rooted = match rooted.as_str() {
            "0" => false,
            "1" => true,
            _ => return None,
        };
        Some(Self {
            platform: platform.clone(),
            process_name: process_name.clone(),
            app_version: app_version.clone(),
            user_info: user_info.clone(),
            device_id: device_id.clone(),
            device_info: device_info.clone(),
            rooted,
        })
    }
}
