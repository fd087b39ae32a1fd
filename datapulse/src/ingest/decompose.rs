use log::warn;

use crate::{DataPlatformError, Result, SubFrame};

/// Splits one frame piece into pieces whose allocation fits `max_bytes`,
/// halving along the row axis until every piece fits. The timestamp schedule
/// is preserved per piece: clocks restart at the piece's first row, lists are
/// sliced. Pieces come back in row order.
///
/// A single-row piece that still exceeds the limit cannot be split further
/// and is forwarded as-is; the converter decides whether it violates the
/// transport cap.
pub fn decompose_frame(piece: SubFrame, max_bytes: usize) -> Result<Vec<SubFrame>> {
    if max_bytes == 0 {
        return Err(DataPlatformError::Config(
            "frame decomposer: max frame size is zero".to_string(),
        ));
    }
    let mut pieces = Vec::new();
    split_into(piece, max_bytes, &mut pieces)?;
    Ok(pieces)
}

fn split_into(piece: SubFrame, max_bytes: usize, out: &mut Vec<SubFrame>) -> Result<()> {
    if piece.allocation() <= max_bytes {
        out.push(piece);
        return Ok(());
    }
    let count = piece.sample_count();
    if count <= 1 {
        warn!(
            "frame decomposer: single-row piece at offset {} is {} bytes, over the {} byte limit",
            piece.row_offset,
            piece.allocation(),
            max_bytes
        );
        out.push(piece);
        return Ok(());
    }
    let (head, tail) = piece.split_rows(count / 2)?;
    split_into(head, max_bytes, out)?;
    split_into(tail, max_bytes, out)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        ColumnValues, DataColumn, IngestionFrame, SamplingClock, Schedule, Timestamp,
    };

    fn frame(count: usize) -> IngestionFrame {
        let clock =
            SamplingClock::new(Timestamp::new(0, 0), count, Duration::from_secs(1)).unwrap();
        let column = DataColumn::new(
            "pv1",
            ColumnValues::Float64((0..count).map(|i| i as f64).collect()),
        );
        IngestionFrame::new(Schedule::Clock(clock), vec![column]).unwrap()
    }

    #[test]
    fn fitting_frame_passes_through() {
        let pieces = decompose_frame(SubFrame::root(frame(10)), 1 << 20).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].row_offset, 0);
    }

    #[test]
    fn oversized_frame_splits_until_every_piece_fits() {
        let original = frame(1000);
        let total = original.allocation();
        let limit = total / 3;
        let pieces = decompose_frame(SubFrame::root(original), limit).unwrap();

        assert!(pieces.len() >= 2);
        assert!(pieces.iter().all(|piece| piece.allocation() <= limit));

        // Pieces are contiguous, in row order, and cover every row once.
        let mut next_row = 0;
        for piece in &pieces {
            assert_eq!(piece.row_offset, next_row);
            next_row += piece.sample_count();
        }
        assert_eq!(next_row, 1000);

        // Per-piece clocks restart where the previous piece ended.
        for piece in &pieces {
            assert_eq!(
                piece.frame().schedule().timestamp_at(0),
                Some(Timestamp::new(piece.row_offset as i64, 0))
            );
        }
    }

    #[test]
    fn reassembled_values_match_the_original() {
        let pieces = decompose_frame(SubFrame::root(frame(1000)), 900).unwrap();
        let mut recovered = Vec::new();
        for piece in &pieces {
            recovered.extend_from_slice(
                piece.frame().columns()[0].values.as_f64().unwrap(),
            );
        }
        let expected: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn single_row_piece_survives() {
        let pieces = decompose_frame(SubFrame::root(frame(1)), 1).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].sample_count(), 1);
    }

    #[test]
    fn exact_fit_is_one_piece() {
        let original = frame(100);
        let exact = original.allocation();
        let pieces = decompose_frame(SubFrame::root(original), exact).unwrap();
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn zero_limit_is_a_config_error() {
        assert!(matches!(
            decompose_frame(SubFrame::root(frame(2)), 0),
            Err(DataPlatformError::Config(_))
        ));
    }
}
