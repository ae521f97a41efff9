//! Packed RGB/UYVY to planar YUV 4:2:0 conversion (BT.601, limited range).
//!
//! Frames whose size differs from the target geometry are resampled with
//! nearest-neighbour lookup, so a source that changes resolution mid-recording
//! still yields frames the open encoder accepts.

use crate::models::error::CaptureError;
use crate::models::frame::{PixelFormat, PreviewImage, RawVideoFrame, Yuv420Frame};

/// Round a dimension down to the nearest even value, minimum 2.
pub fn even_dimension(value: u32) -> u32 {
    (value & !1).max(2)
}

#[inline]
fn rgb_to_y(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// Byte offsets of R, G, B inside a 4-byte pixel.
fn rgb_offsets(format: PixelFormat) -> Option<(usize, usize, usize)> {
    match format {
        PixelFormat::Rgba | PixelFormat::Rgbx => Some((0, 1, 2)),
        PixelFormat::Bgra | PixelFormat::Bgrx => Some((2, 1, 0)),
        PixelFormat::Uyvy => None,
    }
}

struct Sampler<'a> {
    frame: &'a RawVideoFrame,
    target_width: u32,
    target_height: u32,
}

impl Sampler<'_> {
    /// Source coordinates for a target pixel.
    #[inline]
    fn source_xy(&self, x: u32, y: u32) -> (usize, usize) {
        let sx = (x as u64 * self.frame.width as u64 / self.target_width as u64) as usize;
        let sy = (y as u64 * self.frame.height as u64 / self.target_height as u64) as usize;
        (sx, sy)
    }

    /// Full-resolution Y and the pixel's own chroma pair.
    #[inline]
    fn yuv(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let (sx, sy) = self.source_xy(x, y);
        let row = &self.frame.data[sy * self.frame.stride..];
        match rgb_offsets(self.frame.format) {
            Some((ro, go, bo)) => {
                let p = &row[sx * 4..sx * 4 + 4];
                let (r, g, b) = (p[ro] as i32, p[go] as i32, p[bo] as i32);
                (rgb_to_y(r, g, b), rgb_to_u(r, g, b), rgb_to_v(r, g, b))
            }
            None => {
                // U Y0 V Y1: one chroma pair per two pixels.
                let pair = (sx / 2) * 4;
                let luma = if sx % 2 == 0 { row[pair + 1] } else { row[pair + 3] };
                (luma, row[pair], row[pair + 2])
            }
        }
    }
}

/// Convert a raw frame into planar YUV 4:2:0 at `width` × `height`.
///
/// Both target dimensions must be even.
pub fn to_yuv420(frame: &RawVideoFrame, width: u32, height: u32) -> Result<Yuv420Frame, CaptureError> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(CaptureError::WriterEncode(format!(
            "target geometry must be even and non-zero, got {}x{}",
            width, height
        )));
    }
    if frame.width == 0 || frame.height == 0 || !frame.is_complete() {
        return Err(CaptureError::WriterEncode(format!(
            "incomplete {:?} frame {}x{} (stride {}, {} bytes)",
            frame.format,
            frame.width,
            frame.height,
            frame.stride,
            frame.data.len()
        )));
    }

    let sampler = Sampler {
        frame,
        target_width: width,
        target_height: height,
    };
    let (w, h) = (width as usize, height as usize);
    let mut y_plane = vec![0u8; w * h];
    let mut u_plane = vec![0u8; (w / 2) * (h / 2)];
    let mut v_plane = vec![0u8; (w / 2) * (h / 2)];

    for by in 0..(h / 2) {
        for bx in 0..(w / 2) {
            let mut u_sum = 0u32;
            let mut v_sum = 0u32;
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (x, y) = (bx * 2 + dx, by * 2 + dy);
                let (luma, u, v) = sampler.yuv(x as u32, y as u32);
                y_plane[y * w + x] = luma;
                u_sum += u as u32;
                v_sum += v as u32;
            }
            u_plane[by * (w / 2) + bx] = ((u_sum + 2) / 4) as u8;
            v_plane[by * (w / 2) + bx] = ((v_sum + 2) / 4) as u8;
        }
    }

    Ok(Yuv420Frame {
        width,
        height,
        y: y_plane,
        u: u_plane,
        v: v_plane,
    })
}

/// Copy a frame into a tightly packed RGBA preview image.
pub fn to_preview(frame: &RawVideoFrame) -> Option<PreviewImage> {
    if frame.width == 0 || frame.height == 0 || !frame.is_complete() {
        return None;
    }
    let (w, h) = (frame.width as usize, frame.height as usize);
    let mut rgba = Vec::with_capacity(w * h * 4);

    for y in 0..h {
        let row = &frame.data[y * frame.stride..];
        match rgb_offsets(frame.format) {
            Some((ro, go, bo)) => {
                let opaque = matches!(frame.format, PixelFormat::Rgbx | PixelFormat::Bgrx);
                for p in row[..w * 4].chunks_exact(4) {
                    rgba.extend_from_slice(&[p[ro], p[go], p[bo], if opaque { 255 } else { p[3] }]);
                }
            }
            None => {
                for x in 0..w {
                    let pair = (x / 2) * 4;
                    let luma = if x % 2 == 0 { row[pair + 1] } else { row[pair + 3] };
                    let (r, g, b) = yuv_to_rgb(luma, row[pair], row[pair + 2]);
                    rgba.extend_from_slice(&[r, g, b, 255]);
                }
            }
        }
    }

    Some(PreviewImage {
        width: frame.width,
        height: frame.height,
        rgba,
    })
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    (r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, format: PixelFormat, pixel: [u8; 4]) -> RawVideoFrame {
        let data = pixel.repeat((width * height) as usize);
        RawVideoFrame::packed(width, height, format, data)
    }

    #[test]
    fn even_dimension_rounds_down() {
        assert_eq!(even_dimension(1920), 1920);
        assert_eq!(even_dimension(1081), 1080);
        assert_eq!(even_dimension(1), 2);
    }

    #[test]
    fn black_and_white_map_to_limited_range() {
        let black = to_yuv420(&solid(4, 4, PixelFormat::Rgba, [0, 0, 0, 255]), 4, 4).unwrap();
        assert!(black.y.iter().all(|&y| y == 16));
        assert!(black.u.iter().all(|&u| u == 128));

        let white = to_yuv420(&solid(4, 4, PixelFormat::Rgba, [255, 255, 255, 255]), 4, 4).unwrap();
        assert!(white.y.iter().all(|&y| y == 235));
        assert!(white.v.iter().all(|&v| v == 128));
    }

    #[test]
    fn bgra_and_rgba_agree() {
        let rgba = to_yuv420(&solid(2, 2, PixelFormat::Rgba, [200, 40, 10, 255]), 2, 2).unwrap();
        let bgra = to_yuv420(&solid(2, 2, PixelFormat::Bgra, [10, 40, 200, 255]), 2, 2).unwrap();
        assert_eq!(rgba, bgra);
        // Red has high V.
        assert!(rgba.v[0] > 180);
    }

    #[test]
    fn plane_sizes_match_geometry() {
        let frame = to_yuv420(&solid(8, 6, PixelFormat::Bgrx, [1, 2, 3, 0]), 8, 6).unwrap();
        assert_eq!(frame.y.len(), 48);
        assert_eq!(frame.u.len(), 12);
        assert_eq!(frame.byte_len(), 72);
    }

    #[test]
    fn stride_padding_is_skipped() {
        let mut frame = solid(2, 2, PixelFormat::Rgba, [255, 255, 255, 255]);
        // Pad each row with 8 black bytes.
        let mut data = Vec::new();
        for row in frame.data.chunks(8) {
            data.extend_from_slice(row);
            data.extend_from_slice(&[0; 8]);
        }
        frame.data = data;
        frame.stride = 16;
        let yuv = to_yuv420(&frame, 2, 2).unwrap();
        assert!(yuv.y.iter().all(|&y| y == 235));
    }

    #[test]
    fn uyvy_passes_luma_through() {
        let frame = solid(4, 2, PixelFormat::Uyvy, [128, 100, 128, 200]);
        let yuv = to_yuv420(&frame, 4, 2).unwrap();
        assert_eq!(&yuv.y[..4], &[100, 200, 100, 200]);
        assert_eq!(yuv.u, vec![128, 128]);
    }

    #[test]
    fn odd_width_uyvy_needs_whole_pixel_pairs() {
        // Three pixels span two U Y V Y groups.
        let padded = RawVideoFrame::packed(3, 2, PixelFormat::Uyvy, [128, 90, 128, 90].repeat(4));
        assert_eq!(padded.stride, 8);
        let yuv = to_yuv420(&padded, 2, 2).unwrap();
        assert!(yuv.y.iter().all(|&y| y == 90));

        let mut truncated = padded.clone();
        truncated.stride = 6;
        truncated.data.truncate(12);
        assert!(matches!(to_yuv420(&truncated, 2, 2), Err(CaptureError::WriterEncode(_))));
        assert!(to_preview(&truncated).is_none());
    }

    #[test]
    fn resized_source_is_resampled() {
        let frame = solid(8, 8, PixelFormat::Rgba, [0, 0, 0, 255]);
        let yuv = to_yuv420(&frame, 4, 4).unwrap();
        assert_eq!(yuv.y.len(), 16);
    }

    #[test]
    fn odd_target_and_short_buffers_are_rejected() {
        let frame = solid(4, 4, PixelFormat::Rgba, [0, 0, 0, 0]);
        assert!(to_yuv420(&frame, 3, 4).is_err());

        let mut short = frame.clone();
        short.data.truncate(10);
        assert!(matches!(to_yuv420(&short, 4, 4), Err(CaptureError::WriterEncode(_))));
    }

    #[test]
    fn preview_forces_opaque_alpha_for_x_formats() {
        let preview = to_preview(&solid(2, 1, PixelFormat::Bgrx, [10, 20, 30, 0])).unwrap();
        assert_eq!(preview.rgba, vec![30, 20, 10, 255, 30, 20, 10, 255]);
    }
}
