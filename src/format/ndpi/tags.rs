//! NDPI tag vocabulary.
//!
//! Only the tags needed to locate image data, plus the Hamamatsu private tags
//! that describe each directory, are named here. Records with other tags are
//! still decoded and kept by their numeric id.

use serde::Serialize;

/// Tag IDs relevant to NDPI decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum NdpiTag {
    // -------------------------------------------------------------------------
    // Baseline TIFF
    // -------------------------------------------------------------------------
    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Compression scheme of the strip data
    Compression = 259,

    /// Free-form description
    ImageDescription = 270,

    /// Scanner manufacturer
    Make = 271,

    /// Scanner model
    Model = 272,

    /// Byte offset of the image strip
    StripOffsets = 273,

    /// Byte length of the image strip
    StripByteCounts = 279,

    /// Pixels per resolution unit in X
    XResolution = 282,

    /// Pixels per resolution unit in Y
    YResolution = 283,

    /// Unit of XResolution/YResolution
    ResolutionUnit = 296,

    /// Shared JPEG tables
    JpegTables = 347,

    // -------------------------------------------------------------------------
    // Hamamatsu private tags
    // -------------------------------------------------------------------------
    /// Set to 1 in every NDPI directory
    FormatFlag = 65420,

    /// Objective magnification; -1 marks the macro image, -2 the focus map
    SourceLens = 65421,

    /// Physical X offset from the slide centre in nanometres
    XOffsetFromSlideCentre = 65422,

    /// Physical Y offset from the slide centre in nanometres
    YOffsetFromSlideCentre = 65423,

    /// Z position of the focal plane in nanometres
    FocalPlane = 65424,

    /// Byte offsets of JPEG restart markers within the strip
    McuStarts = 65426,

    /// Reference identifier
    Reference = 65427,

    /// Key=value scanner property map
    PropertyMap = 65449,
}

impl NdpiTag {
    /// Create an NdpiTag from its numeric value.
    ///
    /// Returns `None` for tags outside the named set.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(NdpiTag::ImageWidth),
            257 => Some(NdpiTag::ImageLength),
            259 => Some(NdpiTag::Compression),
            270 => Some(NdpiTag::ImageDescription),
            271 => Some(NdpiTag::Make),
            272 => Some(NdpiTag::Model),
            273 => Some(NdpiTag::StripOffsets),
            279 => Some(NdpiTag::StripByteCounts),
            282 => Some(NdpiTag::XResolution),
            283 => Some(NdpiTag::YResolution),
            296 => Some(NdpiTag::ResolutionUnit),
            347 => Some(NdpiTag::JpegTables),
            65420 => Some(NdpiTag::FormatFlag),
            65421 => Some(NdpiTag::SourceLens),
            65422 => Some(NdpiTag::XOffsetFromSlideCentre),
            65423 => Some(NdpiTag::YOffsetFromSlideCentre),
            65424 => Some(NdpiTag::FocalPlane),
            65426 => Some(NdpiTag::McuStarts),
            65427 => Some(NdpiTag::Reference),
            65449 => Some(NdpiTag::PropertyMap),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}
