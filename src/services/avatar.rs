//! Avatar crop, rasterize and upload pipeline.
//!
//! DESIGN
//! ======
//! The client shows the source image scaled to fit its layout and lets the
//! user drag a square crop over it. The crop arrives in on-screen pixels
//! together with the displayed size, the image's natural size and the
//! device pixel ratio. [`plan_crop`] maps that selection back to natural
//! pixels and sizes the output canvas as
//! `floor(crop * natural / displayed * dpr)` per axis, so high-DPI screens
//! produce sharper avatars. The circular mask the user sees is a preview
//! affordance only; the stored PNG is the full square.
//!
//! ERROR HANDLING
//! ==============
//! Precondition failures (no image, no crop, degenerate selection, upload
//! already running) are reported before anything touches the network.
//! Blob and document failures surface with the backend's message. There is
//! no rollback: if the profile update fails after the blob landed, the blob
//! stays and the next upload overwrites it.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::blob::{self, BlobError, UploadProgress};
use crate::model::User;
use crate::state::AppState;
use crate::store::{StoreError, UserStore};

/// Smallest accepted crop edge, in on-screen pixels.
pub const MIN_CROP_PX: f64 = 100.0;
/// Allowed width/height mismatch for a "square" crop.
pub const SQUARE_TOLERANCE_PX: f64 = 1.0;
/// Highest device pixel ratio a client may report.
pub const MAX_DEVICE_PIXEL_RATIO: f64 = 4.0;
/// Longest edge of the rendered avatar, in pixels.
pub const MAX_OUTPUT_EDGE: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("no image provided")]
    MissingImage,
    #[error("no crop selection provided")]
    MissingCrop,
    #[error("invalid display geometry: {0}")]
    InvalidGeometry(&'static str),
    #[error("crop must be at least {MIN_CROP_PX}x{MIN_CROP_PX} pixels")]
    CropTooSmall,
    #[error("crop must be square")]
    NotSquare,
    #[error("crop extends outside the image")]
    OutOfBounds,
    #[error("an upload is already in progress")]
    AlreadyUploading,
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("image processing task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Crop selection in on-screen (CSS) pixels relative to the displayed image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// How the source image was laid out when the crop was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub natural_width: u32,
    pub natural_height: u32,
    pub display_width: f64,
    pub display_height: f64,
    pub device_pixel_ratio: f64,
}

/// Source rectangle in natural pixels and the output canvas size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPlan {
    pub source_x: u32,
    pub source_y: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

// =============================================================================
// CROP MATH
// =============================================================================

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_px(value: f64) -> u32 {
    value.floor().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Validate `crop` against `geometry` and compute the rasterization plan.
///
/// # Errors
///
/// Returns an error for degenerate geometry or a crop that is too small,
/// not square, or outside the displayed image.
pub fn plan_crop(crop: CropRect, geometry: DisplayGeometry) -> Result<CropPlan, AvatarError> {
    let DisplayGeometry { natural_width, natural_height, display_width, display_height, device_pixel_ratio } = geometry;
    if natural_width == 0 || natural_height == 0 {
        return Err(AvatarError::InvalidGeometry("natural size is zero"));
    }
    if !(display_width.is_finite() && display_height.is_finite() && display_width > 0.0 && display_height > 0.0) {
        return Err(AvatarError::InvalidGeometry("display size must be positive"));
    }
    if !(device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0) {
        return Err(AvatarError::InvalidGeometry("device pixel ratio must be positive"));
    }
    if device_pixel_ratio > MAX_DEVICE_PIXEL_RATIO {
        return Err(AvatarError::InvalidGeometry("device pixel ratio too large"));
    }

    let CropRect { x, y, width, height } = crop;
    if ![x, y, width, height].iter().all(|v| v.is_finite()) {
        return Err(AvatarError::OutOfBounds);
    }
    if width < MIN_CROP_PX || height < MIN_CROP_PX {
        return Err(AvatarError::CropTooSmall);
    }
    if (width - height).abs() > SQUARE_TOLERANCE_PX {
        return Err(AvatarError::NotSquare);
    }
    let tolerance = SQUARE_TOLERANCE_PX;
    if x < -tolerance || y < -tolerance || x + width > display_width + tolerance || y + height > display_height + tolerance
    {
        return Err(AvatarError::OutOfBounds);
    }

    let scale_x = f64::from(natural_width) / display_width;
    let scale_y = f64::from(natural_height) / display_height;

    // Huge natural images shrink to fit the output cap, keeping aspect.
    let canvas_width = width * scale_x * device_pixel_ratio;
    let canvas_height = height * scale_y * device_pixel_ratio;
    let shrink = (f64::from(MAX_OUTPUT_EDGE) / canvas_width.max(canvas_height)).min(1.0);
    let output_width = floor_px(canvas_width * shrink).clamp(1, MAX_OUTPUT_EDGE);
    let output_height = floor_px(canvas_height * shrink).clamp(1, MAX_OUTPUT_EDGE);

    let source_x = floor_px(x.max(0.0) * scale_x).min(natural_width - 1);
    let source_y = floor_px(y.max(0.0) * scale_y).min(natural_height - 1);
    let source_width = floor_px(width * scale_x).clamp(1, natural_width - source_x);
    let source_height = floor_px(height * scale_y).clamp(1, natural_height - source_y);

    let plan = CropPlan { source_x, source_y, source_width, source_height, output_width, output_height };
    debug!(scale_x, scale_y, device_pixel_ratio, ?plan, "crop planned");
    Ok(plan)
}

// =============================================================================
// RASTERIZE / ENCODE
// =============================================================================

/// Copy exactly the planned source pixels and resample to the output canvas.
#[must_use]
pub fn rasterize(image: &DynamicImage, plan: &CropPlan) -> RgbaImage {
    let cropped = image.crop_imm(plan.source_x, plan.source_y, plan.source_width, plan.source_height);
    if cropped.width() == plan.output_width && cropped.height() == plan.output_height {
        debug!(width = plan.output_width, height = plan.output_height, "crop already at output size, skipping resize");
        return cropped.to_rgba8();
    }
    debug!(
        source_width = plan.source_width,
        source_height = plan.source_height,
        output_width = plan.output_width,
        output_height = plan.output_height,
        "resampling crop"
    );
    cropped
        .resize_exact(plan.output_width, plan.output_height, FilterType::Lanczos3)
        .to_rgba8()
}

/// # Errors
///
/// Returns an error if the PNG encoder fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, AvatarError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Decode, plan, rasterize and encode in one step. The decoded image's own
/// dimensions take precedence over the reported natural size.
///
/// # Errors
///
/// Returns decode, validation or encode failures.
pub fn render_avatar_png(bytes: &[u8], crop: CropRect, geometry: DisplayGeometry) -> Result<(Vec<u8>, CropPlan), AvatarError> {
    let image = image::load_from_memory(bytes)?;
    if (image.width(), image.height()) != (geometry.natural_width, geometry.natural_height) {
        debug!(
            reported_width = geometry.natural_width,
            reported_height = geometry.natural_height,
            decoded_width = image.width(),
            decoded_height = image.height(),
            "reported natural size differs from decoded image"
        );
    }
    let geometry = DisplayGeometry { natural_width: image.width(), natural_height: image.height(), ..geometry };
    let plan = plan_crop(crop, geometry)?;
    let png = encode_png(&rasterize(&image, &plan))?;
    Ok((png, plan))
}

// =============================================================================
// UPLOAD
// =============================================================================

/// Inputs gathered from the client; any may be missing.
#[derive(Debug, Default, Clone)]
pub struct AvatarRequest {
    pub image: Option<Vec<u8>>,
    pub crop: Option<CropRect>,
    pub geometry: Option<DisplayGeometry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvatarUploaded {
    pub avatar_url: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

/// Run the full pipeline and point the profile at the new avatar.
pub async fn upload_avatar(state: &AppState, user: &User, request: AvatarRequest) -> Result<AvatarUploaded, AvatarError> {
    let image = request
        .image
        .filter(|bytes| !bytes.is_empty())
        .ok_or(AvatarError::MissingImage)?;
    let crop = request.crop.ok_or(AvatarError::MissingCrop)?;
    let geometry = request.geometry.ok_or(AvatarError::MissingCrop)?;

    let _uploading = state
        .uploads
        .begin(user.uid)
        .ok_or(AvatarError::AlreadyUploading)?;

    let (png, plan) = tokio::task::spawn_blocking(move || render_avatar_png(&image, crop, geometry))
        .await
        .map_err(|e| AvatarError::Task(e.to_string()))??;

    let uid = user.uid;
    let path = blob::avatar_path(uid);
    let on_progress = move |progress: UploadProgress| {
        debug!(
            %uid,
            bytes_transferred = progress.bytes_transferred,
            total_bytes = progress.total_bytes,
            percent = progress.percent(),
            "avatar upload progress"
        );
    };
    let meta = state
        .blobs
        .upload_resumable(&path, &png, "image/png", &on_progress)
        .await?;
    let avatar_url = state.blobs.download_url(&path).await?;

    state.store.set_avatar_url(uid, &avatar_url).await?;
    if user.role.has_mirror_record() && state.store.closer_exists(uid).await? {
        state.store.set_closer_avatar_url(uid, &avatar_url).await?;
    }

    info!(%uid, width = plan.output_width, height = plan.output_height, bytes = meta.size, "avatar updated");
    Ok(AvatarUploaded { avatar_url, width: plan.output_width, height: plan.output_height, bytes: meta.size })
}

#[cfg(test)]
#[path = "avatar_test.rs"]
mod tests;
