//! Inpainting error enums.
use std::collections::TryReserveError;

/// Error for inpainting calculations.
#[derive(Clone, Debug)]
pub enum InpaintError {
    /// The image `width` and/or `height` is equal to `0`.
    InvalidImageDimension,
    /// The image buffer length does not match the dimensions.
    MismatchedImageBuffer,
    /// The mask buffer length does not match the image dimensions.
    MismatchedMaskBuffer,
    /// The image is too small to be reduced into a multi-scale pyramid with
    /// the requested patch size.
    ImageTooSmall,
    /// The run was cancelled through the progress sink.
    Cancelled,
    /// Space could not be reserved for a collection required in the
    /// inpainting calculation.
    Reserve(TryReserveError),
    /// A general error occurred.
    General(&'static str),
}

impl std::fmt::Display for InpaintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidImageDimension => write!(f, "Image dimension cannot be 0"),
            Self::MismatchedImageBuffer => {
                write!(f, "Image buffer length does not equal image dimensions")
            }
            Self::MismatchedMaskBuffer => {
                write!(f, "Mask buffer length does not equal image dimensions")
            }
            Self::ImageTooSmall => write!(
                f,
                "Image dimensions must exceed the patch size to build a pyramid"
            ),
            Self::Cancelled => write!(f, "Inpainting run was cancelled"),
            Self::Reserve(e) => write!(f, "{e}"),
            Self::General(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for InpaintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Reserve(e) => e.source(),
            Self::InvalidImageDimension
            | Self::MismatchedImageBuffer
            | Self::MismatchedMaskBuffer
            | Self::ImageTooSmall
            | Self::Cancelled
            | Self::General(_) => None,
        }
    }
}

impl std::convert::From<TryReserveError> for InpaintError {
    fn from(error: TryReserveError) -> Self {
        Self::Reserve(error)
    }
}

impl std::convert::From<&'static str> for InpaintError {
    fn from(error: &'static str) -> Self {
        Self::General(error)
    }
}
