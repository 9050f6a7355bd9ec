//! Turning message text into coverage masks.

/// 8-bit coverage, row-major, `width * height` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphMask {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl GlyphMask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self { width, height, data }
    }

    pub fn empty() -> Self {
        Self { width: 0, height: 0, data: Vec::new() }
    }

    pub fn coverage(&self, x: u32, y: u32) -> u8 {
        self.data.get((y * self.width + x) as usize).copied().unwrap_or(0)
    }
}

/// Renders text into a coverage mask. Explicit `\n` starts a new line; there is no wrapping.
pub trait GlyphRasterizer: Send {
    fn rasterize(&mut self, text: &str) -> GlyphMask;
}

impl GlyphRasterizer for Box<dyn GlyphRasterizer> {
    fn rasterize(&mut self, text: &str) -> GlyphMask {
        (**self).rasterize(text)
    }
}

/// Fixed-cell rasterizer: every visible character is a solid block. Deterministic on any host.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockGlyphs;

impl BlockGlyphs {
    pub const CELL_WIDTH: u32 = 8;
    pub const CELL_HEIGHT: u32 = 16;
}

impl GlyphRasterizer for BlockGlyphs {
    fn rasterize(&mut self, text: &str) -> GlyphMask {
        let lines: Vec<&str> = text.split('\n').collect();
        let columns = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;
        let width = columns * Self::CELL_WIDTH;
        let height = lines.len() as u32 * Self::CELL_HEIGHT;
        let mut data = vec![0u8; width as usize * height as usize];
        for (row, line) in lines.iter().enumerate() {
            for (col, ch) in line.chars().enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let x0 = col as u32 * Self::CELL_WIDTH;
                let y0 = row as u32 * Self::CELL_HEIGHT;
                for y in y0 + 2..y0 + Self::CELL_HEIGHT - 2 {
                    for x in x0 + 1..x0 + Self::CELL_WIDTH - 1 {
                        data[(y * width + x) as usize] = 255;
                    }
                }
            }
        }
        GlyphMask::new(width, height, data)
    }
}

#[cfg(windows)]
pub use gdi::GdiRasterizer;

#[cfg(windows)]
mod gdi {
    use super::{GlyphMask, GlyphRasterizer};
    use log::warn;
    use std::{mem, ptr};
    use windows_sys::Win32::Foundation::SIZE;
    use windows_sys::Win32::Graphics::Gdi::{
        ANTIALIASED_QUALITY, BI_RGB, BITMAPINFO, BITMAPINFOHEADER, CreateCompatibleDC,
        CreateDIBSection, CreateFontIndirectW, DIB_RGB_COLORS, DeleteDC, DeleteObject, GdiFlush,
        GetTextExtentPoint32W, HDC, HFONT, LOGFONTW, SelectObject, SetBkMode, SetTextColor,
        TRANSPARENT, TextOutW,
    };

    const FACE: &str = "Segoe UI";
    const FONT_HEIGHT: i32 = 20;
    const FONT_WEIGHT: i32 = 600;

    /// Grayscale-antialiased GDI text on a memory DC. White on black, so any channel of the DIB
    /// is the coverage.
    pub struct GdiRasterizer {
        dc: HDC,
        font: HFONT,
    }

    // The DC and font are only touched through `&mut self`.
    unsafe impl Send for GdiRasterizer {}

    impl GdiRasterizer {
        pub fn new() -> Option<Self> {
            unsafe {
                let dc = CreateCompatibleDC(ptr::null_mut());
                if dc.is_null() {
                    warn!("CreateCompatibleDC failed");
                    return None;
                }
                let mut lf: LOGFONTW = mem::zeroed();
                lf.lfHeight = -FONT_HEIGHT;
                lf.lfWeight = FONT_WEIGHT;
                lf.lfQuality = ANTIALIASED_QUALITY;
                for (dst, src) in lf.lfFaceName.iter_mut().zip(FACE.encode_utf16()) {
                    *dst = src;
                }
                let font = CreateFontIndirectW(&lf);
                if font.is_null() {
                    warn!("CreateFontIndirectW(`{FACE}`) failed");
                    DeleteDC(dc);
                    return None;
                }
                SelectObject(dc, font);
                SetBkMode(dc, TRANSPARENT);
                SetTextColor(dc, 0x00FF_FFFF);
                Some(Self { dc, font })
            }
        }

        fn extent(&self, line: &[u16]) -> (i32, i32) {
            let mut size = SIZE { cx: 0, cy: 0 };
            unsafe {
                GetTextExtentPoint32W(self.dc, line.as_ptr(), line.len() as i32, &mut size);
            }
            (size.cx.max(0), size.cy.max(FONT_HEIGHT))
        }
    }

    impl GlyphRasterizer for GdiRasterizer {
        fn rasterize(&mut self, text: &str) -> GlyphMask {
            let lines: Vec<Vec<u16>> = text.split('\n').map(|l| l.encode_utf16().collect()).collect();
            let extents: Vec<(i32, i32)> = lines.iter().map(|l| self.extent(l)).collect();
            let width = extents.iter().map(|e| e.0).max().unwrap_or(0);
            let height: i32 = extents.iter().map(|e| e.1).sum();
            if width <= 0 || height <= 0 {
                return GlyphMask::empty();
            }

            unsafe {
                let mut info: BITMAPINFO = mem::zeroed();
                info.bmiHeader = BITMAPINFOHEADER {
                    biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB,
                    ..mem::zeroed()
                };
                let mut bits: *mut core::ffi::c_void = ptr::null_mut();
                let bitmap = CreateDIBSection(self.dc, &info, DIB_RGB_COLORS, &mut bits, ptr::null_mut(), 0);
                if bitmap.is_null() || bits.is_null() {
                    warn!("CreateDIBSection {width}x{height} failed");
                    return GlyphMask::empty();
                }
                let previous = SelectObject(self.dc, bitmap);

                let mut y = 0;
                for (line, (_, h)) in lines.iter().zip(&extents) {
                    TextOutW(self.dc, 0, y, line.as_ptr(), line.len() as i32);
                    y += h;
                }
                GdiFlush();

                let count = width as usize * height as usize;
                let pixels = std::slice::from_raw_parts(bits as *const [u8; 4], count);
                let data = pixels.iter().map(|p| p[0].max(p[1]).max(p[2])).collect();

                SelectObject(self.dc, previous);
                DeleteObject(bitmap);
                GlyphMask::new(width as u32, height as u32, data)
            }
        }
    }

    impl Drop for GdiRasterizer {
        fn drop(&mut self) {
            unsafe {
                DeleteObject(self.font);
                DeleteDC(self.dc);
            }
        }
    }
}
