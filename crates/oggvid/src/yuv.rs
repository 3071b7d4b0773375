//! YCbCr to RGBA conversion.
//!
//! Fixed 256-entry lookup tables computed once per process from ITU-R BT.601
//! studio-range coefficients. The tables are write-once/read-only, so the
//! transform is pure and safe to share across every clip in the process.

use std::sync::OnceLock;

use crate::codec::YuvPicture;

/// 16.16 fixed-point coefficient tables.
struct Bt601Tables {
    y: [i32; 256],
    r_v: [i32; 256],
    g_u: [i32; 256],
    g_v: [i32; 256],
    b_u: [i32; 256],
}

fn tables() -> &'static Bt601Tables {
    static TABLES: OnceLock<Bt601Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut t = Bt601Tables {
            y: [0; 256],
            r_v: [0; 256],
            g_u: [0; 256],
            g_v: [0; 256],
            b_u: [0; 256],
        };
        for i in 0..256 {
            let luma = i as i32 - 16;
            let chroma = i as i32 - 128;
            t.y[i] = 76309 * luma; // 1.164 in 16.16
            t.r_v[i] = 104597 * chroma; // 1.596
            t.g_u[i] = -25675 * chroma; // -0.392
            t.g_v[i] = -53279 * chroma; // -0.813
            t.b_u[i] = 132201 * chroma; // 2.017
        }
        t
    })
}

#[inline]
fn clamp8(v: i32) -> u8 {
    ((v + 0x8000) >> 16).clamp(0, 255) as u8
}

/// Converts a 4:2:0 picture into interleaved RGBA rows of a padded
/// destination buffer. Only the `width` x `height` image region is written;
/// the pad region is the caller's to fill.
pub fn yuv420_to_rgba(
    picture: &YuvPicture,
    dest: &mut [u8],
    dest_stride: usize,
    width: usize,
    height: usize,
) {
    let t = tables();
    for row in 0..height {
        let y_row = &picture.y.data[row * picture.y.stride..];
        let u_row = &picture.u.data[(row / 2) * picture.u.stride..];
        let v_row = &picture.v.data[(row / 2) * picture.v.stride..];
        let out = &mut dest[row * dest_stride..row * dest_stride + width * 4];
        for col in 0..width {
            let luma = t.y[y_row[col] as usize];
            let u = u_row[col / 2] as usize;
            let v = v_row[col / 2] as usize;
            let px = &mut out[col * 4..col * 4 + 4];
            px[0] = clamp8(luma + t.r_v[v]);
            px[1] = clamp8(luma + t.g_u[u] + t.g_v[v]);
            px[2] = clamp8(luma + t.b_u[u]);
            px[3] = 0xFF;
        }
    }
}

/// Fills the pad region of a padded RGBA buffer (the columns right of the
/// image and the rows below it) with a packed 0xAARRGGBB colour.
pub fn fill_pad_region(
    dest: &mut [u8],
    padded_width: usize,
    padded_height: usize,
    width: usize,
    height: usize,
    colour: u32,
) {
    let px = [
        (colour >> 16) as u8,
        (colour >> 8) as u8,
        colour as u8,
        (colour >> 24) as u8,
    ];
    for row in 0..height {
        let start = row * padded_width * 4 + width * 4;
        for chunk in dest[start..(row + 1) * padded_width * 4].chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }
    for chunk in dest[height * padded_width * 4..padded_height * padded_width * 4]
        .chunks_exact_mut(4)
    {
        chunk.copy_from_slice(&px);
    }
}
