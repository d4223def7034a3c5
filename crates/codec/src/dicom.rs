//! DICOM codec
//!
//! Walks the dataset element by element and keeps the textual attributes.
//! Pixel data is skipped, whatever its encoding.
//!
//! Accepted inputs:
//! - Part-10 files: 128-byte preamble, `DICM`, explicit VR little endian
//!   file meta group (0002,xxxx), then the dataset in the transfer syntax
//!   the meta group names.
//! - Raw datasets without preamble, read as implicit VR little endian.
//!
//! Explicit VR big endian is rejected.

use crate::error::{CodecError, CodecResult};
use crate::image::{expect_format, ClinicalImage, DomainImage};
use crate::traits::{ImageDecoder, ImageEncoder};
use biobundle_core::{keys, ImageFormat, ImageHeader};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

/// Implicit VR little endian transfer syntax UID.
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
/// Explicit VR little endian transfer syntax UID.
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
/// Explicit VR big endian transfer syntax UID (retired, unsupported).
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";

const PREAMBLE_LEN: usize = 128;
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
const MAX_NESTING: usize = 32;

/// VRs whose explicit encoding has two reserved bytes and a 32-bit length.
const LONG_VRS: [&[u8; 2]; 13] = [
    b"OB", b"OW", b"OF", b"SQ", b"UT", b"UN", b"UC", b"UR", b"OD", b"OL", b"OV", b"SV", b"UV",
];

/// VRs kept as text.
const TEXT_VRS: [&[u8; 2]; 15] = [
    b"AE", b"AS", b"CS", b"DA", b"DS", b"DT", b"IS", b"LO", b"LT", b"PN", b"SH", b"ST", b"TM",
    b"UI", b"UT",
];

/// A DICOM attribute tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DicomTag {
    /// Group number
    pub group: u16,
    /// Element number
    pub element: u16,
}

impl DicomTag {
    /// Transfer Syntax UID
    pub const TRANSFER_SYNTAX_UID: DicomTag = DicomTag::new(0x0002, 0x0010);
    /// Study Date
    pub const STUDY_DATE: DicomTag = DicomTag::new(0x0008, 0x0020);
    /// Modality
    pub const MODALITY: DicomTag = DicomTag::new(0x0008, 0x0060);
    /// Patient's Name
    pub const PATIENT_NAME: DicomTag = DicomTag::new(0x0010, 0x0010);
    /// Patient ID
    pub const PATIENT_ID: DicomTag = DicomTag::new(0x0010, 0x0020);
    /// Study Instance UID
    pub const STUDY_INSTANCE_UID: DicomTag = DicomTag::new(0x0020, 0x000D);
    /// Series Instance UID
    pub const SERIES_INSTANCE_UID: DicomTag = DicomTag::new(0x0020, 0x000E);
    /// Rows
    pub const ROWS: DicomTag = DicomTag::new(0x0028, 0x0010);
    /// Columns
    pub const COLUMNS: DicomTag = DicomTag::new(0x0028, 0x0011);
    /// Pixel Data
    pub const PIXEL_DATA: DicomTag = DicomTag::new(0x7FE0, 0x0010);

    const ITEM: DicomTag = DicomTag::new(0xFFFE, 0xE000);
    const ITEM_DELIMITATION: DicomTag = DicomTag::new(0xFFFE, 0xE00D);
    const SEQUENCE_DELIMITATION: DicomTag = DicomTag::new(0xFFFE, 0xE0DD);

    /// Create a tag.
    pub const fn new(group: u16, element: u16) -> Self {
        DicomTag { group, element }
    }

    /// VR of the attributes kept from implicit VR datasets.
    fn implicit_vr(self) -> Option<&'static [u8; 2]> {
        match (self.group, self.element) {
            (0x0008, 0x0020) => Some(b"DA"),
            (0x0008, 0x0060) => Some(b"CS"),
            (0x0010, 0x0010) => Some(b"PN"),
            (0x0010, 0x0020) => Some(b"LO"),
            (0x0020, 0x000D) | (0x0020, 0x000E) => Some(b"UI"),
            (0x0028, 0x0010) | (0x0028, 0x0011) => Some(b"US"),
            _ => None,
        }
    }
}

impl fmt::Display for DicomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

fn err(detail: impl Into<String>) -> CodecError {
    CodecError::decode(ImageFormat::Dicom, detail)
}

/// Element header as read from the stream.
struct ElementHeader {
    tag: DicomTag,
    vr: Option<[u8; 2]>,
    length: u32,
}

/// Cursor over a little endian dataset.
struct DatasetParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    explicit_vr: bool,
}

impl<'a> DatasetParser<'a> {
    fn new(bytes: &'a [u8], pos: usize, explicit_vr: bool) -> Self {
        DatasetParser {
            bytes,
            pos,
            explicit_vr,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                err(format!(
                    "need {} bytes at offset {}, only {} left",
                    len,
                    self.pos,
                    self.bytes.len().saturating_sub(self.pos)
                ))
            })?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn peek_group(&self) -> Option<u16> {
        self.bytes
            .get(self.pos..self.pos + 2)
            .map(LittleEndian::read_u16)
    }

    fn read_header(&mut self) -> CodecResult<ElementHeader> {
        let raw = self.take(4)?;
        let tag = DicomTag::new(
            LittleEndian::read_u16(&raw[0..2]),
            LittleEndian::read_u16(&raw[2..4]),
        );

        // Item and delimitation tags never carry a VR
        if tag.group == 0xFFFE || !self.explicit_vr {
            let length = LittleEndian::read_u32(self.take(4)?);
            return Ok(ElementHeader {
                tag,
                vr: None,
                length,
            });
        }

        let vr_raw = self.take(2)?;
        let vr = [vr_raw[0], vr_raw[1]];
        let length = if LONG_VRS.contains(&&vr) {
            self.take(2)?;
            LittleEndian::read_u32(self.take(4)?)
        } else {
            LittleEndian::read_u16(self.take(2)?) as u32
        };
        Ok(ElementHeader {
            tag,
            vr: Some(vr),
            length,
        })
    }

    /// Skip the items of an undefined-length sequence up to and including
    /// its sequence delimitation item.
    fn skip_sequence(&mut self, depth: usize) -> CodecResult<()> {
        if depth > MAX_NESTING {
            return Err(err("sequence nesting too deep"));
        }
        loop {
            let tag_raw = self.take(4)?;
            let tag = DicomTag::new(
                LittleEndian::read_u16(&tag_raw[0..2]),
                LittleEndian::read_u16(&tag_raw[2..4]),
            );
            let length = LittleEndian::read_u32(self.take(4)?);
            match tag {
                DicomTag::SEQUENCE_DELIMITATION => return Ok(()),
                DicomTag::ITEM if length == UNDEFINED_LENGTH => self.skip_item(depth + 1)?,
                DicomTag::ITEM => {
                    self.take(length as usize)?;
                }
                other => {
                    return Err(err(format!(
                        "unexpected tag {} inside sequence at offset {}",
                        other, self.pos
                    )))
                }
            }
        }
    }

    /// Skip the elements of an undefined-length item up to and including its
    /// item delimitation.
    fn skip_item(&mut self, depth: usize) -> CodecResult<()> {
        loop {
            let header = self.read_header()?;
            if header.tag == DicomTag::ITEM_DELIMITATION {
                return Ok(());
            }
            if header.length == UNDEFINED_LENGTH {
                self.skip_sequence(depth + 1)?;
            } else {
                self.take(header.length as usize)?;
            }
        }
    }
}

/// Attributes and transfer syntax of one dataset.
struct ParsedDataset {
    transfer_syntax: String,
    attributes: BTreeMap<DicomTag, String>,
}

fn text_value(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(|c| c == '\0' || c == ' ')
        .trim_start()
        .to_string()
}

fn value_to_text(vr: &[u8; 2], raw: &[u8]) -> Option<String> {
    if TEXT_VRS.contains(&vr) {
        return Some(text_value(raw));
    }
    match vr {
        b"US" if raw.len() >= 2 => Some(LittleEndian::read_u16(raw).to_string()),
        b"UL" if raw.len() >= 4 => Some(LittleEndian::read_u32(raw).to_string()),
        _ => None,
    }
}

/// Stateless DICOM codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomCodec;

impl DicomCodec {
    fn parse(bytes: &[u8]) -> CodecResult<ParsedDataset> {
        let mut attributes = BTreeMap::new();

        let is_part10 = bytes.get(PREAMBLE_LEN..PREAMBLE_LEN + 4) == Some(b"DICM".as_slice());
        let (transfer_syntax, start) = if is_part10 {
            let mut meta = DatasetParser::new(bytes, PREAMBLE_LEN + 4, true);
            let mut transfer_syntax = None;
            while meta.peek_group() == Some(0x0002) {
                let header = meta.read_header()?;
                let value = meta.take(header.length as usize)?;
                if header.tag == DicomTag::TRANSFER_SYNTAX_UID {
                    transfer_syntax = Some(text_value(value));
                }
            }
            let transfer_syntax = transfer_syntax
                .ok_or_else(|| err("file meta group has no transfer syntax UID"))?;
            (transfer_syntax, meta.pos)
        } else {
            if bytes.len() < 8 {
                return Err(err("dataset too short"));
            }
            (IMPLICIT_VR_LITTLE_ENDIAN.to_string(), 0)
        };

        if transfer_syntax == EXPLICIT_VR_BIG_ENDIAN {
            return Err(err("explicit VR big endian is not supported"));
        }
        let explicit_vr = transfer_syntax != IMPLICIT_VR_LITTLE_ENDIAN;

        let mut parser = DatasetParser::new(bytes, start, explicit_vr);
        while !parser.at_end() {
            let header = parser.read_header()?;
            if header.tag.group == 0xFFFE {
                return Err(err(format!(
                    "unexpected item tag {} at top level",
                    header.tag
                )));
            }
            if header.length == UNDEFINED_LENGTH {
                parser.skip_sequence(0)?;
                continue;
            }
            let value = parser.take(header.length as usize)?;
            if header.tag == DicomTag::PIXEL_DATA {
                continue;
            }
            let vr = match header.vr {
                Some(vr) => vr,
                None => match header.tag.implicit_vr() {
                    Some(vr) => *vr,
                    None => continue,
                },
            };
            if let Some(text) = value_to_text(&vr, value) {
                attributes.insert(header.tag, text);
            }
        }

        Ok(ParsedDataset {
            transfer_syntax,
            attributes,
        })
    }

    fn header_from(attributes: &BTreeMap<DicomTag, String>) -> ImageHeader {
        let mut header = ImageHeader::new(ImageFormat::Dicom);
        let wanted = [
            (DicomTag::PATIENT_ID, keys::PATIENT_ID),
            (DicomTag::PATIENT_NAME, keys::PATIENT_NAME),
            (DicomTag::ROWS, keys::ROWS),
            (DicomTag::COLUMNS, keys::COLUMNS),
        ];
        for (tag, key) in wanted {
            if let Some(value) = attributes.get(&tag) {
                header.insert(key, value.clone());
            }
        }
        header
    }
}

impl ImageDecoder for DicomCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Dicom
    }

    fn decode_header(&self, bytes: &[u8]) -> CodecResult<ImageHeader> {
        let dataset = Self::parse(bytes)?;
        tracing::trace!(
            transfer_syntax = %dataset.transfer_syntax,
            attributes = dataset.attributes.len(),
            "Parsed DICOM dataset"
        );
        Ok(Self::header_from(&dataset.attributes))
    }

    fn decode_image(&self, bytes: &[u8], header: ImageHeader) -> CodecResult<DomainImage> {
        expect_format(ImageFormat::Dicom, header.storage_format())?;
        let dataset = Self::parse(bytes)?;
        Ok(DomainImage::Dicom(ClinicalImage::new(
            header,
            bytes.to_vec(),
            dataset.transfer_syntax,
            dataset.attributes,
        )))
    }
}

impl ImageEncoder for DicomCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Dicom
    }

    fn encode_image_to(&self, image: &DomainImage, out: &mut dyn Write) -> CodecResult<()> {
        expect_format(ImageFormat::Dicom, image.format())?;
        out.write_all(image.encoded())?;
        Ok(())
    }
}
