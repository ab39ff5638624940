//! Planar 4:2:0 layout conversions
//!
//! The pipeline consumes semi-planar NV12; engine frames arrive as planar
//! I420. Conversion handles encoded heights padded or cropped to the
//! transform's 16-pixel alignment, independently per plane with half
//! resolution chroma.

use crate::errors::{CodecError, CodecResult};
use crate::types::I420Buffer;

/// Convert an I420 frame to a tightly packed NV12 buffer of
/// `width x encoded_height`
///
/// When `encoded_height` exceeds the frame height the content is centered
/// and the padding rows replicate the nearest edge row; when it is smaller
/// the frame is cropped symmetrically. Luma and chroma planes are handled
/// independently.
pub fn i420_to_nv12(buffer: &I420Buffer, encoded_height: u32) -> CodecResult<Vec<u8>> {
    let width = buffer.width() as usize;
    let height = buffer.height() as i64;
    let eh = encoded_height as i64;

    if width == 0 || height == 0 || eh == 0 {
        return Err(CodecError::InvalidParameter(format!(
            "cannot convert {}x{} frame to encoded height {}",
            width, height, eh
        )));
    }

    let chroma_width = (width + 1) / 2;
    let uv_stride = chroma_width * 2;
    let src_uv_rows = (height + 1) / 2;
    let dst_uv_rows = eh / 2;

    // Negative when cropping.
    let pad_top_y = (eh - height) / 2;
    let pad_top_uv = pad_top_y / 2;

    let mut nv12 = vec![0u8; width * eh as usize + uv_stride * dst_uv_rows as usize];
    let (y_plane, uv_plane) = nv12.split_at_mut(width * eh as usize);

    let src_y = buffer.data_y();
    let stride_y = buffer.stride_y();
    for row in 0..eh {
        let src_row = (row - pad_top_y).clamp(0, height - 1) as usize;
        let src_start = src_row * stride_y;
        let dst_start = row as usize * width;
        y_plane[dst_start..dst_start + width]
            .copy_from_slice(&src_y[src_start..src_start + width]);
    }

    let src_u = buffer.data_u();
    let src_v = buffer.data_v();
    let stride_u = buffer.stride_u();
    let stride_v = buffer.stride_v();
    for row in 0..dst_uv_rows {
        let src_row = (row - pad_top_uv).clamp(0, src_uv_rows - 1) as usize;
        let u_start = src_row * stride_u;
        let v_start = src_row * stride_v;
        let dst_start = row as usize * uv_stride;
        for x in 0..chroma_width {
            uv_plane[dst_start + 2 * x] = src_u[u_start + x];
            uv_plane[dst_start + 2 * x + 1] = src_v[v_start + x];
        }
    }

    Ok(nv12)
}

/// Deinterleave a tightly packed NV12 buffer back to contiguous I420 planes
///
/// Used by the software transform, whose codec wants planar input.
pub fn nv12_to_i420(nv12: &[u8], width: u32, height: u32) -> CodecResult<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let chroma_width = (w + 1) / 2;
    let uv_stride = chroma_width * 2;
    let uv_rows = h / 2;

    let expected = w * h + uv_stride * uv_rows;
    if nv12.len() < expected {
        return Err(CodecError::InvalidParameter(format!(
            "NV12 buffer too small: {} < {} for {}x{}",
            nv12.len(),
            expected,
            width,
            height
        )));
    }

    let chroma_size = chroma_width * uv_rows;
    let mut i420 = vec![0u8; w * h + 2 * chroma_size];

    i420[..w * h].copy_from_slice(&nv12[..w * h]);

    let uv_plane = &nv12[w * h..];
    let (rest, v_plane) = i420.split_at_mut(w * h + chroma_size);
    let u_plane = &mut rest[w * h..];
    for row in 0..uv_rows {
        let src_start = row * uv_stride;
        let dst_start = row * chroma_width;
        for x in 0..chroma_width {
            u_plane[dst_start + x] = uv_plane[src_start + 2 * x];
            v_plane[dst_start + x] = uv_plane[src_start + 2 * x + 1];
        }
    }

    Ok(i420)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned_buffer(width: u32, height: u32) -> I420Buffer {
        let w = width as usize;
        let h = height as usize;
        let cw = (w + 1) / 2;
        let ch = (h + 1) / 2;

        let mut data_y = vec![0u8; w * h];
        for (row, chunk) in data_y.chunks_mut(w).enumerate() {
            chunk.fill(row as u8);
        }
        let mut data_u = vec![0u8; cw * ch];
        for (row, chunk) in data_u.chunks_mut(cw).enumerate() {
            chunk.fill(100 + row as u8);
        }
        let mut data_v = vec![0u8; cw * ch];
        for (row, chunk) in data_v.chunks_mut(cw).enumerate() {
            chunk.fill(200 + row as u8);
        }

        I420Buffer::from_planes(width, height, data_y, data_u, data_v, w, cw, cw)
    }

    #[test]
    fn exact_height_converts_all_rows() {
        let buffer = patterned_buffer(16, 16);
        let nv12 = i420_to_nv12(&buffer, 16).expect("conversion should succeed");

        assert_eq!(nv12.len(), 16 * 16 + 16 * 8);
        // Luma rows carried through in order.
        assert_eq!(nv12[0], 0);
        assert_eq!(nv12[15 * 16], 15);
        // First chroma row interleaves U then V.
        let uv = &nv12[16 * 16..];
        assert_eq!(uv[0], 100);
        assert_eq!(uv[1], 200);
        assert_eq!(uv[2], 100);
    }

    #[test]
    fn padded_height_replicates_edges_and_centers_content() {
        // 16x8 frame padded to height 16: 4 rows of padding top and bottom.
        let buffer = patterned_buffer(16, 8);
        let nv12 = i420_to_nv12(&buffer, 16).expect("conversion should succeed");

        let y = &nv12[..16 * 16];
        // Top padding replicates row 0, content is centered, bottom
        // padding replicates the last row.
        assert_eq!(y[0], 0);
        assert_eq!(y[3 * 16], 0);
        assert_eq!(y[4 * 16], 0);
        assert_eq!(y[5 * 16], 1);
        assert_eq!(y[11 * 16], 7);
        assert_eq!(y[15 * 16], 7);

        // Chroma: 4 source rows centered in 8 destination rows, stride 16.
        let uv = &nv12[16 * 16..];
        assert_eq!(uv[0], 100);
        assert_eq!(uv[2 * 16], 100);
        assert_eq!(uv[3 * 16], 101);
        assert_eq!(uv[7 * 16], 103);
    }

    #[test]
    fn cropped_height_drops_rows_symmetrically() {
        // 16x24 frame cropped to height 16: 4 rows dropped top and bottom.
        let buffer = patterned_buffer(16, 24);
        let nv12 = i420_to_nv12(&buffer, 16).expect("conversion should succeed");

        let y = &nv12[..16 * 16];
        assert_eq!(y[0], 4, "first output row is source row 4");
        assert_eq!(y[15 * 16], 19, "last output row is source row 19");
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let buffer = patterned_buffer(16, 16);
        assert!(i420_to_nv12(&buffer, 0).is_err());
    }

    #[test]
    fn nv12_round_trip_preserves_planes() {
        let buffer = patterned_buffer(32, 16);
        let nv12 = i420_to_nv12(&buffer, 16).expect("conversion should succeed");
        let i420 = nv12_to_i420(&nv12, 32, 16).expect("conversion should succeed");

        assert_eq!(&i420[..32 * 16], buffer.data_y());
        assert_eq!(&i420[32 * 16..32 * 16 + 16 * 8], buffer.data_u());
        assert_eq!(&i420[32 * 16 + 16 * 8..], buffer.data_v());
    }

    #[test]
    fn nv12_to_i420_rejects_short_buffers() {
        assert!(nv12_to_i420(&[0u8; 10], 32, 16).is_err());
    }
}
