//! Storage formats and color spaces
//!
//! Every record in a bundle carries the integer code of its storage format
//! in the record signature and again in the header bytes. The codes are part
//! of the on-disk format and must never be renumbered.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Storage format of an image payload.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageFormat {
    /// No format; never valid for a stored record
    Undefined = 0,
    /// JPEG raster image
    Jpeg = 1,
    /// PNG raster image
    Png = 2,
    /// NIfTI-1 / NIfTI-2 volume
    Nifti = 3,
    /// DICOM dataset
    Dicom = 4,
}

impl ImageFormat {
    /// The four formats a record can be stored in.
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Nifti,
        ImageFormat::Dicom,
    ];

    /// Parse a format from its on-disk code.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(ImageFormat::Undefined),
            1 => Ok(ImageFormat::Jpeg),
            2 => Ok(ImageFormat::Png),
            3 => Ok(ImageFormat::Nifti),
            4 => Ok(ImageFormat::Dicom),
            other => Err(Error::UnknownFormatCode(other)),
        }
    }

    /// On-disk code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// True for every format except `Undefined`.
    pub fn is_defined(self) -> bool {
        self != ImageFormat::Undefined
    }

    /// Conventional file extension for exported images.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            ImageFormat::Jpeg => Some("jpg"),
            ImageFormat::Png => Some("png"),
            ImageFormat::Nifti => Some("nii"),
            ImageFormat::Dicom => Some("dcm"),
            ImageFormat::Undefined => None,
        }
    }

    /// Map a file extension (without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "nii" => Some(ImageFormat::Nifti),
            "dcm" | "dicom" => Some(ImageFormat::Dicom),
            _ => None,
        }
    }

    /// Upper-case name used in logs and header summaries.
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Undefined => "UNDEFINED",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Nifti => "NIFTI",
            ImageFormat::Dicom => "DICOM",
        }
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Undefined
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Color space of a raster image, stored in metadata by name.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Unknown color space
    Undefined = 0,
    /// Linear RGB
    Rgb = 1,
    /// Luminance (grayscale)
    Lum = 2,
}

impl ColorSpace {
    /// Name as stored in the `color space` metadata key.
    pub fn name(self) -> &'static str {
        match self {
            ColorSpace::Undefined => "UNDEFINED",
            ColorSpace::Rgb => "RGB",
            ColorSpace::Lum => "LUM",
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorSpace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UNDEFINED" => Ok(ColorSpace::Undefined),
            "RGB" => Ok(ColorSpace::Rgb),
            "LUM" => Ok(ColorSpace::Lum),
            other => Err(Error::invalid_header(format!(
                "unknown color space '{}'",
                other
            ))),
        }
    }
}
