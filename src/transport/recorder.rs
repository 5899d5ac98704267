//! Records the messages exchanged with the gateway for offline debugging.
//!
//! Recording is enabled by setting IBCHAIN_RECORDING_DIR to a directory. Each session writes
//! into its own subdirectory:
//! /tmp/logs/2025-05-05-09-30-0/0001-request.msg
//! /tmp/logs/2025-05-05-09-30-0/0002-response.msg

use std::env;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::warn;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::messages::{RequestMessage, ResponseMessage};

pub(crate) const RECORDING_DIR_VAR: &str = "IBCHAIN_RECORDING_DIR";

static RECORDING_SEQ: AtomicUsize = AtomicUsize::new(0);
static RECORDER_ID: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Debug, Default)]
pub(crate) struct MessageRecorder {
    enabled: bool,
    recording_dir: String,
}

impl MessageRecorder {
    pub fn from_env() -> Self {
        match env::var(RECORDING_DIR_VAR) {
            Ok(dir) if !dir.is_empty() => Self::in_dir(&dir),
            _ => Self::default(),
        }
    }

    fn in_dir(dir: &str) -> Self {
        let format = format_description!("[year]-[month]-[day]-[hour]-[minute]");
        let now = OffsetDateTime::now_utc();
        let instance_id = RECORDER_ID.fetch_add(1, Ordering::SeqCst);

        let stamp = match now.format(&format) {
            Ok(stamp) => stamp,
            Err(err) => {
                warn!("could not format recording timestamp: {err}");
                now.unix_timestamp().to_string()
            }
        };
        let recording_dir = format!("{dir}/{stamp}-{instance_id}");

        if let Err(err) = fs::create_dir_all(&recording_dir) {
            warn!("recording disabled, could not create {recording_dir}: {err}");
            return Self::default();
        }

        MessageRecorder {
            enabled: true,
            recording_dir,
        }
    }

    pub fn record_request(&self, message: &RequestMessage) {
        if !self.enabled {
            return;
        }

        let record_id = RECORDING_SEQ.fetch_add(1, Ordering::SeqCst);
        self.write(self.request_file(record_id), message.encode_simple());
    }

    pub fn record_response(&self, message: &ResponseMessage) {
        if !self.enabled {
            return;
        }

        let record_id = RECORDING_SEQ.fetch_add(1, Ordering::SeqCst);
        self.write(self.response_file(record_id), message.encode_simple());
    }

    fn write(&self, path: String, contents: String) {
        if let Err(err) = fs::write(&path, contents) {
            warn!("could not record message to {path}: {err}");
        }
    }

    fn request_file(&self, record_id: usize) -> String {
        format!("{}/{:04}-request.msg", self.recording_dir, record_id)
    }

    fn response_file(&self, record_id: usize) -> String {
        format!("{}/{:04}-response.msg", self.recording_dir, record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::OutgoingMessages;
    use serial_test::serial;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn recorded_files(recorder: &MessageRecorder) -> Vec<PathBuf> {
        let mut files = fs::read_dir(&recorder.recording_dir)
            .unwrap()
            .map(|res| res.map(|e| e.path()))
            .collect::<Result<Vec<_>, std::io::Error>>()
            .unwrap();
        files.sort();
        files
    }

    #[test]
    #[serial(env)]
    fn test_recorder_disabled_without_directory() {
        temp_env::with_var(RECORDING_DIR_VAR, Some(""), || {
            let recorder = MessageRecorder::from_env();
            assert!(!recorder.enabled);

            // no files and no panics
            recorder.record_request(&RequestMessage::new());
            recorder.record_response(&ResponseMessage::from_simple("15|1|DU1234567|"));
        });

        temp_env::with_var_unset(RECORDING_DIR_VAR, || {
            assert!(!MessageRecorder::from_env().enabled);
        });
    }

    #[test]
    #[serial(env)]
    fn test_recorder_writes_requests_and_responses() {
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path().to_str().unwrap();

        temp_env::with_var(RECORDING_DIR_VAR, Some(temp_path), || {
            let recorder = MessageRecorder::from_env();
            assert!(recorder.enabled);
            assert!(recorder.recording_dir.starts_with(temp_path));

            let mut request = RequestMessage::new();
            request.push_field(&OutgoingMessages::CancelMarketData);
            request.push_field(&1);
            request.push_field(&9000);

            recorder.record_request(&request);
            recorder.record_response(&ResponseMessage::from_simple("57|1|9000|"));

            let files = recorded_files(&recorder);
            assert_eq!(files.len(), 2);
            assert!(files[0].to_str().unwrap().ends_with("-request.msg"));
            assert!(files[1].to_str().unwrap().ends_with("-response.msg"));
            assert_eq!(fs::read_to_string(&files[0]).unwrap(), "2|1|9000|");
            assert_eq!(fs::read_to_string(&files[1]).unwrap(), "57|1|9000|");
        });
    }
}
