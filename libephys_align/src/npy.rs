use ndarray::{Array, Dimension};
use ndarray_npy::ReadNpyExt;
use std::path::Path;

use super::error::NpyError;

// ndarray-npy only reads an array into the exact element type stored on disk.
// Session and atlas files come from numpy with whatever dtype the pipeline
// produced, so try each numeric dtype in turn and widen the result.
macro_rules! read_as {
    (@try $bytes:ident, $dim:ty, $out:ty, $first:ty $(, $rest:ty)*) => {{
        let mut result: Result<Array<$out, $dim>, ndarray_npy::ReadNpyError> =
            Array::<$first, $dim>::read_npy(&$bytes[..]).map(|a| a.mapv(|v| v as $out));
        $(
            if result.is_err() {
                if let Ok(a) = Array::<$rest, $dim>::read_npy(&$bytes[..]) {
                    result = Ok(a.mapv(|v| v as $out));
                }
            }
        )*
        Ok(result?)
    }};
    ($name:ident, $out:ty) => {
        /// Read a numeric npy file of any integer or float dtype, converting elements
        pub fn $name<D: Dimension>(path: &Path) -> Result<Array<$out, D>, NpyError> {
            if !path.exists() {
                return Err(NpyError::BadFilePath(path.to_path_buf()));
            }
            let bytes = std::fs::read(path)?;
            read_as!(@try bytes, D, $out, f64, f32, i64, i32, i16, i8, u64, u32, u16, u8)
        }
    };
}

read_as!(read_npy_f64, f64);
read_as!(read_npy_f32, f32);
read_as!(read_npy_i64, i64);
