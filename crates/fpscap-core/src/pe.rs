//! Minimal PE header inspection for locally mapped module images.
//!
//! Only the fields the resolver needs are parsed: machine type, link-time
//! `TimeDateStamp` (which selects the resolution strategy) and `SizeOfImage`
//! (which bounds the scan). Every access is bounds-checked; malformed input
//! yields an error, never a panic.

use crate::error::{Error, Result};

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const E_LFANEW_OFFSET: usize = 0x3C;

/// Optional header offset of `SizeOfImage`, identical for PE32 and PE32+.
const SIZE_OF_IMAGE_OFFSET: usize = 0x38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeHeader {
    pub machine: u16,
    pub timestamp: u32,
    pub size_of_image: u32,
}

pub fn parse(image: &[u8]) -> Result<PeHeader> {
    if read_u16(image, 0)? != DOS_MAGIC {
        return Err(Error::InvalidImage("missing MZ magic".to_string()));
    }

    let e_lfanew = read_u32(image, E_LFANEW_OFFSET)? as usize;
    if read_u32(image, e_lfanew)? != PE_SIGNATURE {
        return Err(Error::InvalidImage(format!(
            "missing PE signature at {e_lfanew:#x}"
        )));
    }

    // IMAGE_FILE_HEADER follows the 4-byte signature
    let file_header = e_lfanew + 4;
    let machine = read_u16(image, file_header)?;
    let timestamp = read_u32(image, file_header + 4)?;

    // IMAGE_OPTIONAL_HEADER follows the 20-byte file header
    let optional_header = file_header + 20;
    let size_of_image = read_u32(image, optional_header + SIZE_OF_IMAGE_OFFSET)?;

    Ok(PeHeader {
        machine,
        timestamp,
        size_of_image,
    })
}

fn read_u16(image: &[u8], offset: usize) -> Result<u16> {
    image
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::InvalidImage(format!("truncated header at {offset:#x}")))
}

fn read_u32(image: &[u8], offset: usize) -> Result<u32> {
    image
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::InvalidImage(format!("truncated header at {offset:#x}")))
}
