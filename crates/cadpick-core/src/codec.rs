//! Pixel color/depth codec for pick render passes.
//!
//! Tree indices are packed into RGB using base 255 (not 256), and clip-space
//! depth is packed into all four RGBA bytes with the most significant digit in
//! alpha. Both layouts are shared with the WGSL pick shader and must stay
//! bit-for-bit compatible with it.

/// The cleared pick target pixel. Alpha 0 means "nothing rendered here".
pub const CLEAR_PIXEL: [u8; 4] = [0, 0, 0, 0];

/// Per-channel multiplier for packed tree indices.
pub const TREE_INDEX_BASE: u32 = 255;

/// First tree index that no longer fits in three bytes with base-255 packing.
pub const TREE_INDEX_LIMIT: u32 = 256 * TREE_INDEX_BASE * TREE_INDEX_BASE;

/// Factors applied to `rgba / 255` when unpacking depth.
pub const UNPACK_FACTORS: [f64; 4] = [
    255.0 / 256.0 / (256.0 * 256.0 * 256.0),
    255.0 / 256.0 / (256.0 * 256.0),
    255.0 / 256.0 / 256.0,
    255.0 / 256.0,
];

/// Largest depth that survives packing (every byte 255).
const MAX_PACKED_DEPTH: f64 = 1.0 - 1.0 / 4_294_967_296.0;

/// Packs a tree index into an RGB triple.
///
/// Indices at or above [`TREE_INDEX_LIMIT`] silently wrap in the red channel.
/// Use [`try_pack_tree_index_to_color`] when the input is not trusted.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pack_tree_index_to_color(tree_index: u32) -> [u8; 3] {
    let base_sq = TREE_INDEX_BASE * TREE_INDEX_BASE;
    [
        (tree_index / base_sq) as u8,
        ((tree_index / TREE_INDEX_BASE) % TREE_INDEX_BASE) as u8,
        (tree_index % TREE_INDEX_BASE) as u8,
    ]
}

/// Packs a tree index into an RGB triple, or `None` if it does not fit.
#[must_use]
pub fn try_pack_tree_index_to_color(tree_index: u32) -> Option<[u8; 3]> {
    (tree_index < TREE_INDEX_LIMIT).then(|| pack_tree_index_to_color(tree_index))
}

/// Decodes a tree index from an RGBA pixel read back from a tree-index pass.
///
/// Returns `None` for background pixels (alpha 0), regardless of RGB.
#[must_use]
pub fn decode_tree_index(pixel: [u8; 4]) -> Option<u32> {
    if pixel[3] == 0 {
        return None;
    }
    Some(
        u32::from(pixel[0]) * TREE_INDEX_BASE * TREE_INDEX_BASE
            + u32::from(pixel[1]) * TREE_INDEX_BASE
            + u32::from(pixel[2]),
    )
}

/// Packs a clip-space depth in `[0, 1]` into RGBA bytes.
///
/// Alpha holds the most significant base-256 digit and red the least, which
/// is the layout [`unpack_rgba_to_depth`] inverts. Out-of-range input is clamped.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn pack_depth_to_rgba(depth: f64) -> [u8; 4] {
    let mut rest = depth.clamp(0.0, MAX_PACKED_DEPTH);
    let mut bytes = [0u8; 4];
    for slot in [3, 2, 1, 0] {
        rest *= 256.0;
        let digit = rest.floor();
        bytes[slot] = digit as u8;
        rest -= digit;
    }
    bytes
}

/// Unpacks a clip-space depth from RGBA bytes written by a depth pass.
#[must_use]
pub fn unpack_rgba_to_depth(pixel: [u8; 4]) -> f64 {
    pixel
        .iter()
        .zip(UNPACK_FACTORS)
        .map(|(&byte, factor)| f64::from(byte) / 255.0 * factor)
        .sum()
}

/// Converts a perspective clip depth in `[0, 1]` into a (negative) view-space Z.
#[must_use]
pub fn perspective_depth_to_view_z(clip_depth: f64, near: f64, far: f64) -> f64 {
    (near * far) / ((far - near) * clip_depth - far)
}

/// Converts a view-space Z into a perspective clip depth in `[0, 1]`.
#[must_use]
pub fn view_z_to_perspective_depth(view_z: f64, near: f64, far: f64) -> f64 {
    ((near + view_z) * far) / ((far - near) * view_z)
}
