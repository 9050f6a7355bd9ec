//! Window style bits touched by embedding. Values match the Win32 headers.

pub const WS_CHILD: u32 = 0x4000_0000;
pub const WS_CLIPSIBLINGS: u32 = 0x0400_0000;
pub const WS_CAPTION: u32 = 0x00C0_0000;
pub const WS_BORDER: u32 = 0x0080_0000;
pub const WS_SYSMENU: u32 = 0x0008_0000;
pub const WS_THICKFRAME: u32 = 0x0004_0000;
pub const WS_MINIMIZEBOX: u32 = 0x0002_0000;
pub const WS_MAXIMIZEBOX: u32 = 0x0001_0000;
pub const WS_POPUP: u32 = 0x8000_0000;

pub const WS_EX_DLGMODALFRAME: u32 = 0x0000_0001;
pub const WS_EX_TOPMOST: u32 = 0x0000_0008;
pub const WS_EX_TOOLWINDOW: u32 = 0x0000_0080;
pub const WS_EX_WINDOWEDGE: u32 = 0x0000_0100;
pub const WS_EX_CLIENTEDGE: u32 = 0x0000_0200;
pub const WS_EX_STATICEDGE: u32 = 0x0002_0000;

/// Decorations removed from an embedded window.
pub const DECORATION_MASK: u32 =
    WS_CAPTION | WS_THICKFRAME | WS_MINIMIZEBOX | WS_MAXIMIZEBOX | WS_SYSMENU | WS_BORDER;

/// Edge and palette-window bits removed from an embedded window's extended style.
pub const EX_DECORATION_MASK: u32 = WS_EX_DLGMODALFRAME
    | WS_EX_WINDOWEDGE
    | WS_EX_CLIENTEDGE
    | WS_EX_STATICEDGE
    | WS_EX_TOOLWINDOW
    | WS_EX_TOPMOST;

/// Style of an undecorated child surface derived from `original`.
pub fn embedded_style(original: u32) -> u32 {
    (original & !DECORATION_MASK & !WS_POPUP) | WS_CHILD | WS_CLIPSIBLINGS
}

pub fn embedded_ex_style(original: u32) -> u32 {
    original & !EX_DECORATION_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    const WS_OVERLAPPEDWINDOW: u32 = 0x00CF_0000;
    const WS_VISIBLE: u32 = 0x1000_0000;

    #[test]
    fn overlapped_window_becomes_plain_child() {
        let style = embedded_style(WS_OVERLAPPEDWINDOW | WS_VISIBLE);
        assert_eq!(style, WS_VISIBLE | WS_CHILD | WS_CLIPSIBLINGS);
        assert_eq!(style & (WS_CAPTION | WS_BORDER | WS_THICKFRAME), 0);
    }

    #[test]
    fn popup_bit_cleared() {
        assert_eq!(embedded_style(WS_POPUP) & WS_POPUP, 0);
    }

    #[test]
    fn unrelated_bits_survive() {
        const WS_CLIPCHILDREN: u32 = 0x0200_0000;
        assert_ne!(embedded_style(WS_CLIPCHILDREN) & WS_CLIPCHILDREN, 0);

        const WS_EX_ACCEPTFILES: u32 = 0x10;
        let ex = embedded_ex_style(WS_EX_ACCEPTFILES | WS_EX_CLIENTEDGE | WS_EX_WINDOWEDGE);
        assert_eq!(ex, WS_EX_ACCEPTFILES);
    }
}
