//! Summary streams inside relocatable object files.
//!
//! Between compiler invocations the summary stream travels in a dedicated
//! section of the intermediate object file. Files without that section simply
//! contribute nothing.

use crate::core::OffloadResult;
use object::write;
use object::{Architecture, BinaryFormat, Endianness, Object, ObjectSection, SectionKind};

/// Name of the section holding the summary stream.
pub const SUMMARY_SECTION: &str = ".gnu.lto_.ipa_hsa";

/// Wrap a summary stream in a minimal ELF relocatable object.
pub fn write_summary_section(stream: &[u8]) -> OffloadResult<Vec<u8>> {
    let mut obj = write::Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let section = obj.add_section(
        Vec::new(),
        SUMMARY_SECTION.as_bytes().to_vec(),
        SectionKind::Other,
    );
    obj.section_mut(section).set_data(stream.to_vec(), 1);
    Ok(obj.write()?)
}

/// Extract the summary stream of every object file that carries one, in the
/// order the files are given.
pub fn read_summary_sections<'data>(files: &[&'data [u8]]) -> OffloadResult<Vec<&'data [u8]>> {
    let mut streams = Vec::new();
    for &data in files {
        let file = object::File::parse(data)?;
        match file.section_by_name(SUMMARY_SECTION) {
            Some(section) => streams.push(section.data()?),
            None => log::debug!("Object file without {} section skipped", SUMMARY_SECTION),
        }
    }
    Ok(streams)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_roundtrip() {
        let stream = [1u8, 0, 0x0a, 0];
        let obj = write_summary_section(&stream).unwrap();
        let streams = read_summary_sections(&[obj.as_slice()]).unwrap();
        assert_eq!(streams, vec![&stream[..]]);
    }

    #[test]
    fn files_without_section_are_skipped() {
        let mut obj = write::Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
        obj.section_mut(text).set_data(vec![0xc3], 1);
        let plain = obj.write().unwrap();

        let with = write_summary_section(&[0, 0]).unwrap();
        let streams = read_summary_sections(&[plain.as_slice(), with.as_slice()]).unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0], &[0u8, 0][..]);
    }

    #[test]
    fn garbage_is_an_object_error() {
        let err = read_summary_sections(&[&b"not an object"[..]]).unwrap_err();
        assert!(matches!(err, crate::core::OffloadError::Object(_)));
    }
}
