//! 3x5 ドットのビットマップフォント
//!
//! 英大文字・数字・一部記号のみ。小文字は大文字で描画する。

/// グリフの幅（ドット）
pub const GLYPH_WIDTH: u32 = 3;
/// グリフの高さ（ドット）
pub const GLYPH_HEIGHT: u32 = 5;

/// 各行 3 ビット（bit2 が左端）
pub fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x3, 0x4, 0x4, 0x4, 0x3],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x3, 0x4, 0x5, 0x5, 0x3],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'J' => [0x1, 0x1, 0x1, 0x5, 0x2],
        'K' => [0x5, 0x5, 0x6, 0x5, 0x5],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'M' => [0x5, 0x7, 0x7, 0x5, 0x5],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x2, 0x5, 0x5, 0x5, 0x2],
        'P' => [0x6, 0x5, 0x6, 0x4, 0x4],
        'Q' => [0x2, 0x5, 0x5, 0x6, 0x3],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'V' => [0x5, 0x5, 0x5, 0x5, 0x2],
        'W' => [0x5, 0x5, 0x7, 0x7, 0x5],
        'X' => [0x5, 0x5, 0x2, 0x5, 0x5],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        'Z' => [0x7, 0x1, 0x2, 0x4, 0x7],
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        ':' => [0x0, 0x2, 0x0, 0x2, 0x0],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        ',' => [0x0, 0x0, 0x0, 0x2, 0x4],
        '/' => [0x1, 0x1, 0x2, 0x4, 0x4],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        '=' => [0x0, 0x7, 0x0, 0x7, 0x0],
        '_' => [0x0, 0x0, 0x0, 0x0, 0x7],
        '%' => [0x5, 0x1, 0x2, 0x4, 0x5],
        '(' => [0x2, 0x4, 0x4, 0x4, 0x2],
        ')' => [0x2, 0x1, 0x1, 0x1, 0x2],
        '!' => [0x2, 0x2, 0x2, 0x0, 0x2],
        '?' => [0x6, 0x1, 0x2, 0x0, 0x2],
        _ => [0x7, 0x7, 0x7, 0x7, 0x7],
    }
}

/// 文字送り（グリフ幅 + 1ドット）
pub fn advance(scale: u32) -> u32 {
    (GLYPH_WIDTH + 1) * scale
}

/// 文字列の描画幅（ピクセル）
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * advance(scale)
}

/// 文字列の点灯ピクセルを (x, y) で列挙する
pub fn for_each_pixel<F: FnMut(i32, i32)>(text: &str, x: i32, y: i32, scale: u32, mut plot: F) {
    let scale = scale.max(1) as i32;
    let mut cx = x;
    for c in text.chars() {
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i32 {
                if (bits >> (2 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        plot(cx + col * scale + dx, y + row as i32 * scale + dy);
                    }
                }
            }
        }
        cx += advance(scale as u32) as i32;
    }
}
