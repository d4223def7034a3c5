//! Testing utilities for codecs
//!
//! Builders for small but structurally valid encoded images. They are used
//! by the unit tests here, by the storage integration tests and by the
//! benchmarks.
//!
//! # Example
//!
//! ```ignore
//! use biobundle_codec::testing::jpeg_bytes;
//!
//! let bytes = jpeg_bytes(640, 480);
//! ```

use crate::dicom::EXPLICIT_VR_LITTLE_ENDIAN;
use crate::nifti::{Endianness, NiftiVersion};
use crate::png::PNG_SIGNATURE;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Baseline JPEG: SOI, APP0, SOF0 with three components, SOS, a few bytes
/// of fake scan data, EOI.
pub fn jpeg_bytes(width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];

    out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);

    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 8]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.push(3);
    for id in 1..=3u8 {
        out.extend_from_slice(&[id, 0x11, 0]);
    }

    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C, 3, 1, 0, 2, 0x11, 3, 0x11, 0, 63, 0]);
    out.extend_from_slice(&[0x12, 0x34, 0x56, 0x78, 0x9A]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    let start = out.len();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let crc = crc32fast::hash(&out[start..]);
    out.extend_from_slice(&crc.to_be_bytes());
}

/// 8-bit PNG with the given color type: signature, IHDR, a short IDAT, IEND.
pub fn png_bytes(width: u32, height: u32, color_type: u8) -> Vec<u8> {
    let mut out = PNG_SIGNATURE.to_vec();

    let mut ihdr = [0u8; 13];
    BigEndian::write_u32(&mut ihdr[0..4], width);
    BigEndian::write_u32(&mut ihdr[4..8], height);
    ihdr[8] = 8;
    ihdr[9] = color_type;
    png_chunk(&mut out, b"IHDR", &ihdr);
    png_chunk(&mut out, b"IDAT", &[0x78, 0x9C, 0x63, 0x00, 0x00]);
    png_chunk(&mut out, b"IEND", &[]);
    out
}

/// Little endian single-file NIfTI-1 volume of unsigned bytes.
pub fn nifti1_bytes(dims: [i64; 4]) -> Vec<u8> {
    nifti_bytes(NiftiVersion::Nifti1, Endianness::Little, dims)
}

/// Single-file NIfTI volume of unsigned bytes with 4 dimensions.
///
/// Voxel values count up from 0 and wrap at 256.
pub fn nifti_bytes(version: NiftiVersion, byte_order: Endianness, dims: [i64; 4]) -> Vec<u8> {
    match byte_order {
        Endianness::Little => nifti_with::<LittleEndian>(version, dims),
        Endianness::Big => nifti_with::<BigEndian>(version, dims),
    }
}

fn nifti_with<E: ByteOrder>(version: NiftiVersion, dims: [i64; 4]) -> Vec<u8> {
    let header_size = version.header_size();
    let vox_offset = header_size + 4;
    let mut out = vec![0u8; vox_offset];

    E::write_i32(&mut out[0..4], header_size as i32);
    match version {
        NiftiVersion::Nifti1 => {
            E::write_i16(&mut out[40..42], 4);
            for (i, d) in dims.iter().enumerate() {
                let at = 42 + i * 2;
                E::write_i16(&mut out[at..at + 2], *d as i16);
            }
            E::write_i16(&mut out[70..72], 2);
            E::write_i16(&mut out[72..74], 8);
            E::write_f32(&mut out[108..112], vox_offset as f32);
            out[344..348].copy_from_slice(b"n+1\0");
        }
        NiftiVersion::Nifti2 => {
            out[4..12].copy_from_slice(b"n+2\0\r\n\x1a\n");
            E::write_i16(&mut out[12..14], 2);
            E::write_i16(&mut out[14..16], 8);
            E::write_i64(&mut out[16..24], 4);
            for (i, d) in dims.iter().enumerate() {
                let at = 24 + i * 8;
                E::write_i64(&mut out[at..at + 8], *d);
            }
            E::write_i64(&mut out[168..176], vox_offset as i64);
        }
    }

    let voxels: i64 = dims.iter().map(|d| (*d).max(1)).product();
    out.extend((0..voxels).map(|v| (v % 256) as u8));
    out
}

/// Writes little endian DICOM elements.
struct DicomWriter {
    out: Vec<u8>,
    explicit_vr: bool,
}

impl DicomWriter {
    fn tag(&mut self, group: u16, element: u16) {
        self.out.extend_from_slice(&group.to_le_bytes());
        self.out.extend_from_slice(&element.to_le_bytes());
    }

    fn element(&mut self, group: u16, element: u16, vr: &[u8; 2], value: &[u8]) {
        let mut value = value.to_vec();
        if value.len() % 2 == 1 {
            value.push(if vr == b"UI" { 0 } else { b' ' });
        }
        self.tag(group, element);
        if self.explicit_vr {
            self.out.extend_from_slice(vr);
            if matches!(vr, b"OB" | b"OW" | b"SQ" | b"UN" | b"UT") {
                self.out.extend_from_slice(&[0, 0]);
                self.out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            } else {
                self.out.extend_from_slice(&(value.len() as u16).to_le_bytes());
            }
        } else {
            self.out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        }
        self.out.extend_from_slice(&value);
    }

    fn undefined_sequence_start(&mut self, group: u16, element: u16) {
        self.tag(group, element);
        if self.explicit_vr {
            self.out.extend_from_slice(b"SQ\0\0");
        }
        self.out.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    }

    fn marker(&mut self, element: u16, length: u32) {
        self.tag(0xFFFE, element);
        self.out.extend_from_slice(&length.to_le_bytes());
    }

    /// Referenced-series style sequence: one undefined-length item holding a
    /// UID and a nested sequence with one defined-length item.
    fn nested_sequence(&mut self) {
        self.undefined_sequence_start(0x0008, 0x1140);
        self.marker(0xE000, 0xFFFF_FFFF);
        self.element(0x0008, 0x1150, b"UI", b"1.2.3.4");
        self.undefined_sequence_start(0x0040, 0xA730);

        let mut inner = DicomWriter {
            out: Vec::new(),
            explicit_vr: self.explicit_vr,
        };
        inner.element(0x0008, 0x0100, b"SH", b"AB");
        self.marker(0xE000, inner.out.len() as u32);
        self.out.extend_from_slice(&inner.out);

        self.marker(0xE0DD, 0);
        self.marker(0xE00D, 0);
        self.marker(0xE0DD, 0);
    }

    fn patient_dataset(&mut self, patient_id: &str, patient_name: &str, rows: u16, columns: u16) {
        self.element(0x0008, 0x0060, b"CS", b"MR");
        self.nested_sequence();
        self.element(0x0010, 0x0010, b"PN", patient_name.as_bytes());
        self.element(0x0010, 0x0020, b"LO", patient_id.as_bytes());
        self.element(0x0028, 0x0010, b"US", &rows.to_le_bytes());
        self.element(0x0028, 0x0011, b"US", &columns.to_le_bytes());
        self.element(0x7FE0, 0x0010, b"OW", &[0u8; 8]);
    }
}

/// Part-10 DICOM file in explicit VR little endian with a nested
/// undefined-length sequence before the patient attributes.
pub fn dicom_part10_bytes(patient_id: &str, patient_name: &str, rows: u16, columns: u16) -> Vec<u8> {
    let mut writer = DicomWriter {
        out: vec![0u8; 128],
        explicit_vr: true,
    };
    writer.out.extend_from_slice(b"DICM");
    writer.element(0x0002, 0x0001, b"OB", &[0, 1]);
    writer.element(0x0002, 0x0010, b"UI", EXPLICIT_VR_LITTLE_ENDIAN.as_bytes());
    writer.patient_dataset(patient_id, patient_name, rows, columns);
    writer.out
}

/// Raw implicit VR little endian dataset without preamble.
pub fn dicom_implicit_bytes(patient_id: &str, patient_name: &str, rows: u16, columns: u16) -> Vec<u8> {
    let mut writer = DicomWriter {
        out: Vec::new(),
        explicit_vr: false,
    };
    writer.patient_dataset(patient_id, patient_name, rows, columns);
    writer.out
}
