use std::ops::{Bound, RangeBounds};
use crate::error::{RhiError, RhiResult};

macro_rules! normalize_range_function {
    ($unsigned:ty) => {
        $crate::paste! {
            /// Resolve `bounds` against a resource of `size` units into `(offset, length)`.
            pub(crate) fn [<normalize_range_ $unsigned>]<R: RangeBounds<$unsigned>>(
                bounds: R,
                size: $unsigned,
            ) -> RhiResult<($unsigned, $unsigned)> {
                let out_of_range = || RhiError::InvalidDescriptor(format!("range exceeds resource size {size}"));
                let start = match bounds.start_bound() {
                    Bound::Included(&v) => v,
                    Bound::Excluded(&v) => v.checked_add(1).ok_or_else(out_of_range)?,
                    Bound::Unbounded => 0,
                };
                let end_exclusive = match bounds.end_bound() {
                    Bound::Included(&v) => v.checked_add(1).ok_or_else(out_of_range)?,
                    Bound::Excluded(&v) => v,
                    Bound::Unbounded => size,
                };

                if start > end_exclusive || end_exclusive > size {
                    return Err(out_of_range());
                }

                Ok((start, end_exclusive - start))
            }
        }
    };
}

normalize_range_function!(u64);
normalize_range_function!(u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_checked_against_size() {
        assert_eq!(normalize_range_u64(.., 64).unwrap(), (0, 64));
        assert_eq!(normalize_range_u64(16..32, 64).unwrap(), (16, 16));
        assert_eq!(normalize_range_u32(4..=7, 8).unwrap(), (4, 4));
        assert!(normalize_range_u64(60..70, 64).is_err());
    }
}
