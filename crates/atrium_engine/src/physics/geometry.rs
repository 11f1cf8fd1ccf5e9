//! Render-geometry boundary for collision cooking
//!
//! The cache consumes any renderable geometry that exposes a position
//! attribute (planar or interleaved) and, for exact meshes, an index
//! buffer of 8/16/32-bit width. Extraction normalizes both into the
//! packed forms the backend cooking calls accept: interleaved positions
//! are de-interleaved into a packed float array, and 8-bit indices are
//! widened to 16-bit (backends accept 16- or 32-bit only; 16-bit is
//! preferred for memory).

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Geometry extraction and validation errors
///
/// These reject malformed input deterministically before it reaches a
/// backend cooking call.
#[derive(Error, Debug)]
pub enum GeometryError {
    /// Position buffer is empty
    #[error("geometry has no position data")]
    EmptyPositions,

    /// Packed position buffer length is not a multiple of 3
    #[error("position buffer length {0} is not a multiple of 3")]
    MalformedPositions(usize),

    /// Interleaved layout does not fit its own buffer
    #[error("interleaved layout invalid: stride {stride}, offset {offset}, buffer length {len}")]
    MalformedInterleave {
        /// Floats per vertex
        stride: usize,
        /// Float offset of the position attribute within a vertex
        offset: usize,
        /// Buffer length in floats
        len: usize,
    },

    /// Triangle-mesh cooking requested without an index buffer
    #[error("triangle mesh cooking requires an index buffer")]
    MissingIndices,

    /// Index buffer is empty
    #[error("index buffer is empty")]
    EmptyIndices,

    /// Index count does not describe whole triangles
    #[error("index count {0} is not a multiple of 3")]
    IndexCountNotTriangles(usize),

    /// An index points past the end of the vertex buffer
    #[error("index {index} exceeds vertex count {vertex_count}")]
    IndexOutOfRange {
        /// The offending index value
        index: u32,
        /// Number of vertices in the position buffer
        vertex_count: u32,
    },
}

/// Opaque identity of a renderable geometry instance
///
/// Two geometries with identical vertex content but different identities
/// are distinct for caching purposes: the cooked-shape cache is keyed on
/// identity, not on a content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u64);

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

impl GeometryId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Build an identity from a raw value (asset pipelines that already
    /// have stable mesh ids)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identity value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Position attribute layout
#[derive(Debug, Clone)]
pub enum PositionData {
    /// Packed `x y z x y z ...` floats
    Planar(Vec<f32>),

    /// Positions embedded in an interleaved vertex buffer
    Interleaved {
        /// The interleaved vertex buffer
        data: Vec<f32>,
        /// Floats per vertex
        stride: usize,
        /// Float offset of the position attribute within a vertex
        offset: usize,
    },
}

/// Index buffer widths accepted at the geometry boundary
#[derive(Debug, Clone)]
pub enum IndexData {
    /// 8-bit indices (widened to 16-bit before cooking)
    U8(Vec<u8>),
    /// 16-bit indices
    U16(Vec<u16>),
    /// 32-bit indices
    U32(Vec<u32>),
}

impl IndexData {
    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Whether the buffer holds no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index buffer in a width the backend cooking call accepts
///
/// Borrows the source buffer when no conversion is needed; owns a scratch
/// buffer when 8-bit input had to be widened. Either way the scratch data
/// lives only for the duration of the cooking call.
#[derive(Debug)]
pub enum CookingIndices<'a> {
    /// 16-bit indices (preferred)
    U16(Cow<'a, [u16]>),
    /// 32-bit indices
    U32(Cow<'a, [u32]>),
}

impl CookingIndices<'_> {
    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Whether the buffer holds no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index at position `i`, widened to u32
    pub fn get(&self, i: usize) -> u32 {
        match self {
            Self::U16(v) => u32::from(v[i]),
            Self::U32(v) => v[i],
        }
    }
}

/// A reference to renderable geometry, as consumed by the cooked-shape
/// cache
#[derive(Debug, Clone)]
pub struct GeometrySource {
    id: GeometryId,
    positions: PositionData,
    indices: Option<IndexData>,
}

impl GeometrySource {
    /// Create a geometry source with a freshly allocated identity
    pub fn new(positions: PositionData) -> Self {
        Self::with_id(GeometryId::next(), positions)
    }

    /// Create a geometry source with an explicit identity
    pub fn with_id(id: GeometryId, positions: PositionData) -> Self {
        Self {
            id,
            positions,
            indices: None,
        }
    }

    /// Attach an index buffer (required for triangle-mesh cooking)
    pub fn with_indices(mut self, indices: IndexData) -> Self {
        self.indices = Some(indices);
        self
    }

    /// Identity of this geometry instance
    pub fn id(&self) -> GeometryId {
        self.id
    }

    /// Number of vertices described by the position attribute
    pub fn vertex_count(&self) -> usize {
        match &self.positions {
            PositionData::Planar(data) => data.len() / 3,
            PositionData::Interleaved { data, stride, .. } => {
                if *stride == 0 {
                    0
                } else {
                    data.len() / stride
                }
            }
        }
    }

    /// Extract positions as a packed `x y z` float array
    ///
    /// Planar input is borrowed as-is; interleaved input is de-interleaved
    /// into a packed scratch buffer.
    pub fn packed_positions(&self) -> Result<Cow<'_, [f32]>, GeometryError> {
        match &self.positions {
            PositionData::Planar(data) => {
                if data.is_empty() {
                    return Err(GeometryError::EmptyPositions);
                }
                if data.len() % 3 != 0 {
                    return Err(GeometryError::MalformedPositions(data.len()));
                }
                Ok(Cow::Borrowed(data))
            }
            PositionData::Interleaved {
                data,
                stride,
                offset,
            } => {
                if data.is_empty() {
                    return Err(GeometryError::EmptyPositions);
                }
                let (stride, offset) = (*stride, *offset);
                if stride < 3 || offset + 3 > stride || data.len() % stride != 0 {
                    return Err(GeometryError::MalformedInterleave {
                        stride,
                        offset,
                        len: data.len(),
                    });
                }
                let mut packed = Vec::with_capacity((data.len() / stride) * 3);
                for vertex in data.chunks_exact(stride) {
                    packed.extend_from_slice(&vertex[offset..offset + 3]);
                }
                Ok(Cow::Owned(packed))
            }
        }
    }

    /// Extract indices in a backend-acceptable width, widening 8-bit
    /// input to 16-bit
    ///
    /// Validates triangle structure and index range against the position
    /// attribute.
    pub fn cooking_indices(&self) -> Result<CookingIndices<'_>, GeometryError> {
        let indices = self.indices.as_ref().ok_or(GeometryError::MissingIndices)?;
        if indices.is_empty() {
            return Err(GeometryError::EmptyIndices);
        }
        if indices.len() % 3 != 0 {
            return Err(GeometryError::IndexCountNotTriangles(indices.len()));
        }

        let vertex_count = self.vertex_count() as u32;
        let check = |index: u32| -> Result<(), GeometryError> {
            if index >= vertex_count {
                Err(GeometryError::IndexOutOfRange {
                    index,
                    vertex_count,
                })
            } else {
                Ok(())
            }
        };

        match indices {
            IndexData::U8(data) => {
                let widened: Vec<u16> = data.iter().map(|&i| u16::from(i)).collect();
                for &index in &widened {
                    check(u32::from(index))?;
                }
                Ok(CookingIndices::U16(Cow::Owned(widened)))
            }
            IndexData::U16(data) => {
                for &index in data {
                    check(u32::from(index))?;
                }
                Ok(CookingIndices::U16(Cow::Borrowed(data)))
            }
            IndexData::U32(data) => {
                for &index in data {
                    check(index)?;
                }
                Ok(CookingIndices::U32(Cow::Borrowed(data)))
            }
        }
    }
}
