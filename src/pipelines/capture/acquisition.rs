// SPDX-License-Identifier: MPL-2.0

//! Camera/microphone acquisition with fallbacks
//!
//! One request for video plus audio. Failures are classified into the fixed
//! taxonomy; the raw platform message is only inspected to tell a host-app
//! permission block from an OS denial.
//!
//! Fallback order:
//! 1. ideal size + audio
//! 2. on an overconstrained failure, the same request without size (once)
//! 3. on any other failure, video only; success reports `has_audio = false`
//!
//! Permission and security refusals end acquisition at once. Asking again
//! without audio would only raise a second prompt.

use crate::backends::{
    DeviceFailure, DeviceFailureKind, Facing, MediaDevices, MediaStream, StreamConstraints,
};
use crate::config::CaptureConfig;
use crate::constants::capture::HOST_APP_DENIAL_MARKERS;
use crate::errors::{MediaError, PermissionScope};
use std::sync::Arc;
use tracing::{info, warn};

/// A successfully opened stream
#[derive(Debug)]
pub struct AcquiredStream {
    pub stream: MediaStream,
    /// `false` when the microphone failed and video-only was used
    pub has_audio: bool,
}

/// Classify a raw device failure
pub fn classify(failure: &DeviceFailure) -> MediaError {
    match failure.kind {
        DeviceFailureKind::NotAllowed | DeviceFailureKind::Security => {
            let message = failure.message.to_lowercase();
            let host_app = HOST_APP_DENIAL_MARKERS
                .iter()
                .any(|marker| message.contains(marker));
            if host_app {
                MediaError::PermissionDenied(PermissionScope::HostApp)
            } else {
                MediaError::PermissionDenied(PermissionScope::System)
            }
        }
        DeviceFailureKind::NotFound => MediaError::DeviceNotFound,
        DeviceFailureKind::NotReadable | DeviceFailureKind::Abort | DeviceFailureKind::Other => {
            MediaError::DeviceBusy
        }
        DeviceFailureKind::Overconstrained => MediaError::ConstraintUnsatisfiable,
        DeviceFailureKind::NotSupported => MediaError::RecorderUnsupported,
    }
}

/// Stream acquisition over a device layer
pub struct StreamAcquisition<D: MediaDevices> {
    devices: Arc<D>,
    ideal_width: u32,
    ideal_height: u32,
}

impl<D: MediaDevices> StreamAcquisition<D> {
    pub fn new(devices: Arc<D>, config: &CaptureConfig) -> Self {
        Self {
            devices,
            ideal_width: config.ideal_width,
            ideal_height: config.ideal_height,
        }
    }

    /// Open camera + microphone for `facing`
    pub async fn acquire(&self, facing: Facing) -> Result<AcquiredStream, MediaError> {
        let request = StreamConstraints::ideal(facing, self.ideal_width, self.ideal_height);
        info!(%facing, width = self.ideal_width, height = self.ideal_height, "Requesting camera");

        let (request, failure) = match self.devices.get_user_media(&request).await {
            Ok(stream) => return Ok(Self::opened(stream)),
            Err(failure) if failure.kind == DeviceFailureKind::Overconstrained => {
                warn!(error = %failure.message, "Constraints unsatisfiable, retrying unconstrained");
                let relaxed = request.unconstrained();
                match self.devices.get_user_media(&relaxed).await {
                    Ok(stream) => return Ok(Self::opened(stream)),
                    Err(failure) => (relaxed, failure),
                }
            }
            Err(failure) => (request, failure),
        };

        if !request.audio || Self::is_refusal(&failure) {
            return Err(Self::fail(&failure));
        }

        warn!(
            kind = ?failure.kind,
            error = %failure.message,
            "Camera + microphone request failed, retrying video only"
        );
        match self.devices.get_user_media(&request.video_only()).await {
            Ok(stream) => {
                warn!(stream = %stream.id(), "Recording without audio");
                Ok(AcquiredStream {
                    stream,
                    has_audio: false,
                })
            }
            Err(video_failure) => Err(Self::fail(&video_failure)),
        }
    }

    fn is_refusal(failure: &DeviceFailure) -> bool {
        matches!(
            failure.kind,
            DeviceFailureKind::NotAllowed | DeviceFailureKind::Security
        )
    }

    fn opened(stream: MediaStream) -> AcquiredStream {
        let has_audio = stream.has_audio();
        info!(stream = %stream.id(), facing = %stream.facing(), has_audio, "Camera acquired");
        AcquiredStream { stream, has_audio }
    }

    fn fail(failure: &DeviceFailure) -> MediaError {
        let error = classify(failure);
        warn!(kind = ?failure.kind, raw = %failure.message, ?error, "Camera acquisition failed");
        error
    }
}
