//! Export lookup in a PE image that is mapped in another process.

const DOS_MAGIC: u16 = 0x5A4D;
const NT_SIGNATURE: u32 = 0x0000_4550;
const E_LFANEW: u32 = 0x3C;
const FILE_HEADER_LEN: u32 = 20;
const PE32_MAGIC: u16 = 0x10B;
const PE32_PLUS_MAGIC: u16 = 0x20B;
/// Offset of the export data directory inside each optional header flavor.
const PE32_EXPORT_DIR: u32 = 96;
const PE32_PLUS_EXPORT_DIR: u32 = 112;

/// Random access to a mapped image by RVA.
pub(crate) trait ImageReader {
    /// Fills `buf` from `rva`. False when the range cannot be read.
    fn read(&self, rva: u32, buf: &mut [u8]) -> bool;

    fn u16_at(&self, rva: u32) -> Option<u16> {
        let mut b = [0u8; 2];
        self.read(rva, &mut b).then(|| u16::from_le_bytes(b))
    }

    fn u32_at(&self, rva: u32) -> Option<u32> {
        let mut b = [0u8; 4];
        self.read(rva, &mut b).then(|| u32::from_le_bytes(b))
    }
}

/// `table[index]` for entries of `size` bytes, without overflowing on a corrupt image.
fn entry(table: u32, index: u32, size: u32) -> Option<u32> {
    table.checked_add(index.checked_mul(size)?)
}

/// RVA of the export called `name`, if the image has one.
pub(crate) fn export_rva<R: ImageReader + ?Sized>(image: &R, name: &str) -> Option<u32> {
    if image.u16_at(0)? != DOS_MAGIC {
        return None;
    }
    let nt = image.u32_at(E_LFANEW)?;
    if image.u32_at(nt)? != NT_SIGNATURE {
        return None;
    }
    let optional = nt.checked_add(4 + FILE_HEADER_LEN)?;
    let directory = match image.u16_at(optional)? {
        PE32_MAGIC => PE32_EXPORT_DIR,
        PE32_PLUS_MAGIC => PE32_PLUS_EXPORT_DIR,
        _ => return None,
    };
    let exports = image.u32_at(optional.checked_add(directory)?)?;
    if exports == 0 {
        return None;
    }
    let count = image.u32_at(exports.checked_add(24)?)?;
    let functions = image.u32_at(exports.checked_add(28)?)?;
    let names = image.u32_at(exports.checked_add(32)?)?;
    let ordinals = image.u32_at(exports.checked_add(36)?)?;

    let wanted: Vec<u8> = name.bytes().chain(Some(0)).collect();
    let mut candidate = vec![0u8; wanted.len()];
    for i in 0..count {
        let name_rva = image.u32_at(entry(names, i, 4)?)?;
        if !image.read(name_rva, &mut candidate) || candidate != wanted {
            continue;
        }
        let ordinal = image.u16_at(entry(ordinals, i, 2)?)?;
        return image.u32_at(entry(functions, u32::from(ordinal), 4)?);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Image(Vec<u8>);

    impl ImageReader for Image {
        fn read(&self, rva: u32, buf: &mut [u8]) -> bool {
            let start = rva as usize;
            match self.0.get(start..start + buf.len()) {
                Some(src) => {
                    buf.copy_from_slice(src);
                    true
                }
                None => false,
            }
        }
    }

    impl Image {
        fn put(&mut self, at: usize, bytes: &[u8]) {
            self.0[at..at + bytes.len()].copy_from_slice(bytes);
        }
    }

    /// A PE32+ image exporting `bridge_other` (0x2222) and `bridge_shutdown` (0x1111), with the
    /// name table in sorted order and the ordinals crossed.
    fn image() -> Image {
        let mut img = Image(vec![0; 0x300]);
        img.put(0, &DOS_MAGIC.to_le_bytes());
        img.put(0x3C, &0x80u32.to_le_bytes());
        img.put(0x80, &NT_SIGNATURE.to_le_bytes());
        img.put(0x98, &PE32_PLUS_MAGIC.to_le_bytes());
        img.put(0x98 + 112, &0x200u32.to_le_bytes());

        img.put(0x200 + 24, &2u32.to_le_bytes());
        img.put(0x200 + 28, &0x240u32.to_le_bytes());
        img.put(0x200 + 32, &0x250u32.to_le_bytes());
        img.put(0x200 + 36, &0x260u32.to_le_bytes());
        img.put(0x240, &0x1111u32.to_le_bytes());
        img.put(0x244, &0x2222u32.to_le_bytes());
        img.put(0x250, &0x280u32.to_le_bytes());
        img.put(0x254, &0x290u32.to_le_bytes());
        img.put(0x260, &1u16.to_le_bytes());
        img.put(0x262, &0u16.to_le_bytes());
        img.put(0x280, b"bridge_other\0");
        img.put(0x290, b"bridge_shutdown\0");
        img
    }

    #[test]
    fn finds_exports_through_the_ordinal_table() {
        let img = image();
        assert_eq!(export_rva(&img, "bridge_shutdown"), Some(0x1111));
        assert_eq!(export_rva(&img, "bridge_other"), Some(0x2222));
    }

    #[test]
    fn prefix_is_not_a_match() {
        let img = image();
        assert_eq!(export_rva(&img, "bridge_"), None);
        assert_eq!(export_rva(&img, "bridge_shutdown_now"), None);
    }

    #[test]
    fn non_images_are_rejected() {
        let mut img = image();
        img.put(0, b"XX");
        assert_eq!(export_rva(&img, "bridge_shutdown"), None);

        let mut img = image();
        img.put(0x98, &0x999u16.to_le_bytes());
        assert_eq!(export_rva(&img, "bridge_shutdown"), None);
    }

    #[test]
    fn corrupt_tables_do_not_overflow() {
        let mut img = image();
        img.put(0x200 + 24, &u32::MAX.to_le_bytes());
        img.put(0x200 + 32, &0xFFFF_FFF0u32.to_le_bytes());
        assert_eq!(export_rva(&img, "bridge_shutdown"), None);
    }
}
