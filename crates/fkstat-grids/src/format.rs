//! Grid codec.
//!
//! Two encodings are read. Grids produced by PineAPPL (an lz4 frame, or the
//! bare `PineAPPL` container) are decoded through the `pineappl` crate when
//! the `pineappl` feature is enabled. Grids written by [`GridFile::write`]
//! use a size-prepended lz4 block whose decompressed payload is
//! little-endian:
//!
//! | field               | encoding                                      |
//! |---------------------|-----------------------------------------------|
//! | magic               | `FKGRID01`                                    |
//! | key/value metadata  | `u32` count, then `u32`-length-prefixed UTF-8 |
//! | `muf2`              | `f64`                                         |
//! | x-grid              | `u32` length, `f64` values                    |
//! | bin lower edges     | `u32` bins, `2 * bins` `f64` (row-major)      |
//! | bin normalizations  | `bins` `f64`                                  |
//! | luminosities        | `u32` count, `(i32, i32)` pairs               |
//! | table shape         | `u8` rank (3 or 4), `u32` per dimension       |
//! | coefficients        | `f64`, row-major                              |
//!
//! The table is `(bins, luminosities, nx)` for DIS-like grids and
//! `(bins, luminosities, nx, nx)` for hadronic ones, in both encodings.

use crate::error::{GridError, Result};
use crate::flavour::PROTON;
use log::debug;
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use std::collections::BTreeMap;
use std::path::Path;

/// Magic bytes opening every payload
pub const MAGIC: &[u8; 8] = b"FKGRID01";

/// Metadata key of the first initial state
pub const INITIAL_STATE_1: &str = "initial_state_1";

/// Metadata key of the second initial state
pub const INITIAL_STATE_2: &str = "initial_state_2";

/// Number of binning axes stored per bin
pub const BIN_AXES: usize = 2;

/// Leading bytes of an lz4 frame, as written by PineAPPL
pub const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];

/// Leading bytes of an uncompressed PineAPPL grid
pub const PINEAPPL_MAGIC: &[u8; 8] = b"PineAPPL";

/// In-memory representation of one grid file
#[derive(Debug, Clone, PartialEq)]
pub struct GridFile {
    /// Free-form key/value metadata
    pub key_values: BTreeMap<String, String>,
    /// Factorization scale squared at which the grid was computed
    pub muf2: f64,
    /// Interpolation nodes in x
    pub x_grid: Array1<f64>,
    /// Lower bin edges, one row per bin, one column per binning axis
    pub bin_left: Array2<f64>,
    /// Per-bin normalization (bin widths)
    pub bin_normalizations: Array1<f64>,
    /// Luminosity channels as pairs of particle codes
    pub lumi: Vec<(i32, i32)>,
    /// Coefficient table
    pub table: ArrayD<f64>,
}

impl GridFile {
    /// Read and decode a grid file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GridError::GridNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|e| GridError::io(path, e))?;
        let grid = Self::from_bytes(&bytes)?;
        debug!(
            "Read grid {} with {} bins and {} luminosities",
            path.display(),
            grid.nbins(),
            grid.lumi.len()
        );
        Ok(grid)
    }

    /// Encode and write the grid to `path`
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| GridError::io(path, e))
    }

    /// Decode a grid in either encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if is_pineappl(bytes) {
            return Self::from_pineappl(bytes);
        }
        let payload = lz4_flex::decompress_size_prepended(bytes)?;
        decode_payload(&payload)
    }

    #[cfg(feature = "pineappl")]
    fn from_pineappl(bytes: &[u8]) -> Result<Self> {
        let grid = crate::pineappl_grid::decode(bytes)?;
        grid.check_shape()?;
        Ok(grid)
    }

    #[cfg(not(feature = "pineappl"))]
    fn from_pineappl(_bytes: &[u8]) -> Result<Self> {
        Err(GridError::UnsupportedFormat(
            "PineAPPL grid, rebuild with the `pineappl` feature to read it".to_string(),
        ))
    }

    /// Encode the grid as a compressed block
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.check_shape()?;
        Ok(lz4_flex::compress_prepend_size(&self.encode_payload()))
    }

    /// Number of bins (data points)
    pub fn nbins(&self) -> usize {
        self.bin_normalizations.len()
    }

    /// Whether both initial states are the same hadron
    pub fn is_hadronic(&self) -> Result<bool> {
        Ok(self.initial_state(INITIAL_STATE_1)? == self.initial_state(INITIAL_STATE_2)?)
    }

    /// Whether the grid is hadronic with a proton initial state
    ///
    /// # Errors
    /// * [`GridError::UnsupportedHadron`] for hadronic grids of other species
    pub fn check_proton(&self) -> Result<bool> {
        let hadronic = self.is_hadronic()?;
        let state = self.initial_state(INITIAL_STATE_1)?;
        if hadronic && state != PROTON {
            return Err(GridError::UnsupportedHadron(state.to_string()));
        }
        Ok(hadronic)
    }

    /// Value of an initial state key
    pub fn initial_state(&self, key: &str) -> Result<&str> {
        self.key_values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| GridError::Corrupt(format!("missing metadata key {key}")))
    }

    /// Fitting scale `sqrt(muf2)`
    pub fn q0(&self) -> f64 {
        self.muf2.sqrt()
    }

    /// Sorted distinct lower bin edges along `axis`
    pub fn bin_axis_nodes(&self, axis: usize) -> Result<Vec<f64>> {
        if axis >= BIN_AXES {
            return Err(GridError::Shape(format!(
                "bin axis {axis} out of range, grids have {BIN_AXES}"
            )));
        }
        let mut nodes: Vec<f64> = self.bin_left.column(axis).to_vec();
        nodes.sort_by(f64::total_cmp);
        nodes.dedup();
        Ok(nodes)
    }

    fn check_shape(&self) -> Result<()> {
        let nbins = self.nbins();
        let nx = self.x_grid.len();
        if self.bin_left.dim() != (nbins, BIN_AXES) {
            return Err(GridError::Shape(format!(
                "bin edges have shape {:?}, expected ({nbins}, {BIN_AXES})",
                self.bin_left.dim()
            )));
        }
        let shape = self.table.shape();
        let expected_tail = match shape.len() {
            3 => vec![nx],
            4 => vec![nx, nx],
            rank => {
                return Err(GridError::Shape(format!(
                    "table rank must be 3 or 4, got {rank}"
                )));
            }
        };
        if shape[0] != nbins || shape[1] != self.lumi.len() || shape[2..] != expected_tail[..] {
            return Err(GridError::Shape(format!(
                "table shape {shape:?} does not match {nbins} bins, {} luminosities and {nx} x nodes",
                self.lumi.len()
            )));
        }
        Ok(())
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + 8 * self.table.len());
        out.extend_from_slice(MAGIC);

        put_u32(&mut out, self.key_values.len());
        for (key, value) in &self.key_values {
            put_str(&mut out, key);
            put_str(&mut out, value);
        }

        put_f64(&mut out, self.muf2);

        put_u32(&mut out, self.x_grid.len());
        self.x_grid.iter().for_each(|&x| put_f64(&mut out, x));

        put_u32(&mut out, self.nbins());
        self.bin_left.iter().for_each(|&v| put_f64(&mut out, v));
        self.bin_normalizations
            .iter()
            .for_each(|&v| put_f64(&mut out, v));

        put_u32(&mut out, self.lumi.len());
        for &(a, b) in &self.lumi {
            out.extend_from_slice(&a.to_le_bytes());
            out.extend_from_slice(&b.to_le_bytes());
        }

        let shape = self.table.shape();
        out.push(shape.len() as u8);
        shape.iter().for_each(|&d| put_u32(&mut out, d));
        self.table.iter().for_each(|&v| put_f64(&mut out, v));

        out
    }
}

/// Whether `bytes` hold a grid written by PineAPPL
pub fn is_pineappl(bytes: &[u8]) -> bool {
    bytes.starts_with(&LZ4_FRAME_MAGIC) || bytes.starts_with(PINEAPPL_MAGIC)
}

fn put_u32(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&(value as u32).to_le_bytes());
}

fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u32(out, value.len());
    out.extend_from_slice(value.as_bytes());
}

/// Sequential reader over a decompressed payload
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                GridError::Corrupt(format!(
                    "payload truncated at byte {} (wanted {n} more of {})",
                    self.pos,
                    self.bytes.len()
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.array()?) as usize)
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn f64s(&mut self, n: usize) -> Result<Vec<f64>> {
        // Validate the length before allocating
        let raw = self.take(n.checked_mul(8).ok_or_else(|| {
            GridError::Corrupt(format!("array length {n} overflows"))
        })?)?;
        Ok(raw
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect())
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| GridError::Corrupt(format!("invalid UTF-8 in metadata: {e}")))
    }

    const fn is_exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

fn decode_payload(payload: &[u8]) -> Result<GridFile> {
    let mut cursor = Cursor::new(payload);

    if cursor.take(MAGIC.len())? != MAGIC {
        return Err(GridError::Corrupt("bad magic bytes".to_string()));
    }

    let nkv = cursor.u32()?;
    let mut key_values = BTreeMap::new();
    for _ in 0..nkv {
        let key = cursor.string()?;
        let value = cursor.string()?;
        key_values.insert(key, value);
    }

    let muf2 = cursor.f64()?;

    let nx = cursor.u32()?;
    let x_grid = Array1::from(cursor.f64s(nx)?);

    let nbins = cursor.u32()?;
    let edges = cursor.f64s(nbins * BIN_AXES)?;
    let bin_left = Array2::from_shape_vec((nbins, BIN_AXES), edges)
        .map_err(|e| GridError::Corrupt(e.to_string()))?;
    let bin_normalizations = Array1::from(cursor.f64s(nbins)?);

    let nlumi = cursor.u32()?;
    let lumi = (0..nlumi)
        .map(|_| -> Result<(i32, i32)> { Ok((cursor.i32()?, cursor.i32()?)) })
        .collect::<Result<Vec<_>>>()?;

    let rank = cursor.u8()? as usize;
    let shape = (0..rank)
        .map(|_| cursor.u32())
        .collect::<Result<Vec<_>>>()?;
    let size = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| GridError::Corrupt(format!("table shape {shape:?} overflows")))?;
    let coefficients = cursor.f64s(size)?;
    let table = ArrayD::from_shape_vec(IxDyn(&shape), coefficients)
        .map_err(|e| GridError::Corrupt(e.to_string()))?;

    if !cursor.is_exhausted() {
        return Err(GridError::Corrupt("trailing bytes after table".to_string()));
    }

    let grid = GridFile {
        key_values,
        muf2,
        x_grid,
        bin_left,
        bin_normalizations,
        lumi,
        table,
    };
    grid.check_shape()
        .map_err(|e| GridError::Corrupt(e.to_string()))?;
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dis_grid() -> GridFile {
        let mut key_values = BTreeMap::new();
        key_values.insert(INITIAL_STATE_1.to_string(), "11".to_string());
        key_values.insert(INITIAL_STATE_2.to_string(), PROTON.to_string());
        GridFile {
            key_values,
            muf2: 2.56,
            x_grid: array![0.1, 0.5],
            bin_left: array![[10.0, 0.2], [2.0, 0.2], [10.0, 0.1]],
            bin_normalizations: array![1.0, 1.0, 2.0],
            lumi: vec![(11, 21)],
            table: ArrayD::from_shape_vec(IxDyn(&[3, 1, 2]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
                .unwrap(),
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        let grid = dis_grid();
        let decoded = GridFile::from_bytes(&grid.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, grid);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.pineappl.lz4");
        let grid = dis_grid();
        grid.write(&path).unwrap();
        assert_eq!(GridFile::read(&path).unwrap(), grid);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            GridFile::read("/nonexistent/grid.pineappl.lz4"),
            Err(GridError::GridNotFound(_))
        ));
    }

    #[test]
    fn test_metadata_queries() {
        let grid = dis_grid();
        assert!(!grid.is_hadronic().unwrap());
        assert!(!grid.check_proton().unwrap());
        assert!((grid.q0() - 1.6).abs() < 1e-12);
        assert_eq!(grid.bin_axis_nodes(0).unwrap(), vec![2.0, 10.0]);
        assert_eq!(grid.bin_axis_nodes(1).unwrap(), vec![0.1, 0.2]);
        assert!(grid.bin_axis_nodes(2).is_err());
    }

    #[test]
    fn test_non_proton_hadron() {
        let mut grid = dis_grid();
        grid.key_values
            .insert(INITIAL_STATE_1.to_string(), "-2212".to_string());
        grid.key_values
            .insert(INITIAL_STATE_2.to_string(), "-2212".to_string());
        assert!(grid.is_hadronic().unwrap());
        assert!(matches!(
            grid.check_proton(),
            Err(GridError::UnsupportedHadron(_))
        ));
    }

    #[test]
    fn test_corrupt_payloads() {
        let grid = dis_grid();
        let payload = grid.encode_payload();

        // Truncated table
        let truncated = lz4_flex::compress_prepend_size(&payload[..payload.len() - 4]);
        assert!(matches!(
            GridFile::from_bytes(&truncated),
            Err(GridError::Corrupt(_))
        ));

        // Bad magic
        let mut bad = payload;
        bad[0] = b'X';
        assert!(matches!(
            GridFile::from_bytes(&lz4_flex::compress_prepend_size(&bad)),
            Err(GridError::Corrupt(_))
        ));

        // Not an lz4 block at all
        assert!(GridFile::from_bytes(&[8, 0, 0, 0, 0xf0]).is_err());
    }

    #[test]
    fn test_pineappl_detection() {
        assert!(!is_pineappl(&dis_grid().to_bytes().unwrap()));
        assert!(is_pineappl(b"PineAPPL\x00\x01"));

        let mut framed = lz4_flex::frame::FrameEncoder::new(Vec::new());
        std::io::Write::write_all(&mut framed, b"PineAPPL").unwrap();
        let framed = framed.finish().unwrap();
        assert!(is_pineappl(&framed));
    }

    #[cfg(not(feature = "pineappl"))]
    #[test]
    fn test_pineappl_grid_needs_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("external.pineappl.lz4");
        let mut framed = lz4_flex::frame::FrameEncoder::new(Vec::new());
        std::io::Write::write_all(&mut framed, b"PineAPPL").unwrap();
        std::fs::write(&path, framed.finish().unwrap()).unwrap();
        assert!(matches!(
            GridFile::read(&path),
            Err(GridError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_shape_checked_on_encode() {
        let mut grid = dis_grid();
        grid.lumi.push((11, 22));
        assert!(matches!(grid.to_bytes(), Err(GridError::Shape(_))));
    }
}
