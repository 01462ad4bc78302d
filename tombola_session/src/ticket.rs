// The 90-ball ticket: a 3×9 grid with 5 numbers per row.
//
// Column ranges follow the standard loto layout: column 0 holds 1–9,
// columns 1–7 hold 10c–10c+9, column 8 holds 80–90. Within a column the
// filled values are strictly increasing top-to-bottom, and because the
// column ranges are disjoint a ticket can never contain duplicates.
//
// Generation picks 5 of 9 columns per row, then fills each column with
// distinct sorted values from its range. Three rows means at most 3 values
// per column, which every column range can supply, so generation never
// needs a retry loop.
//
// Marking is validated against the called-number ledger by `Replica` — the
// grid itself only enforces bounds and non-empty cells.

use serde::{Deserialize, Serialize};

use crate::error::MarkError;
use crate::rng::GameRng;

/// Rows per ticket.
pub const ROWS: usize = 3;
/// Columns per ticket.
pub const COLS: usize = 9;
/// Numbered cells per row.
pub const ROW_NUMBERS: usize = 5;

/// One grid cell: an optional number plus its marked flag. Empty cells are
/// never marked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub value: Option<u8>,
    pub marked: bool,
}

/// A player's ticket. Owned by exactly one replica; the host never sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    cells: [[Cell; COLS]; ROWS],
}

/// Inclusive number range covered by a ticket column.
pub fn column_range(col: usize) -> (u8, u8) {
    assert!(col < COLS, "column out of bounds: {col}");
    match col {
        0 => (1, 9),
        8 => (80, 90),
        c => {
            let lo = (c as u8) * 10;
            (lo, lo + 9)
        }
    }
}

impl Ticket {
    /// Generate a fresh unmarked ticket.
    pub fn generate(rng: &mut GameRng) -> Self {
        // Pick 5 of 9 columns for each row via partial Fisher-Yates.
        let mut row_columns = [[false; COLS]; ROWS];
        for row_cols in &mut row_columns {
            let mut cols: [usize; COLS] = std::array::from_fn(|i| i);
            for i in 0..ROW_NUMBERS {
                let j = rng.range_usize(i, COLS);
                cols.swap(i, j);
            }
            for &c in &cols[..ROW_NUMBERS] {
                row_cols[c] = true;
            }
        }

        let mut cells = [[Cell::default(); COLS]; ROWS];
        for col in 0..COLS {
            let rows_using: Vec<usize> = (0..ROWS).filter(|&r| row_columns[r][col]).collect();
            if rows_using.is_empty() {
                continue;
            }
            let (lo, hi) = column_range(col);
            let mut values = Vec::with_capacity(rows_using.len());
            while values.len() < rows_using.len() {
                let v = rng.range_u8_inclusive(lo, hi);
                if !values.contains(&v) {
                    values.push(v);
                }
            }
            values.sort_unstable();
            for (&row, &value) in rows_using.iter().zip(values.iter()) {
                cells[row][col].value = Some(value);
            }
        }

        Self { cells }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Iterate all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Cell)> + '_ {
        self.cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, cell)| (r, c, *cell))
        })
    }

    /// Toggle the mark on a numbered cell whose value appears in `ledger`.
    /// Mutates only that cell. Returns the new marked state.
    pub fn mark(&mut self, row: usize, col: usize, ledger: &[u8]) -> Result<bool, MarkError> {
        if row >= ROWS || col >= COLS {
            return Err(MarkError::OutOfBounds);
        }
        let cell = &mut self.cells[row][col];
        let value = cell.value.ok_or(MarkError::EmptyCell)?;
        if !ledger.contains(&value) {
            return Err(MarkError::NotCalled(value));
        }
        cell.marked = !cell.marked;
        Ok(cell.marked)
    }

    /// A row is complete when every one of its numbered cells is marked.
    /// (A generated row always has 5 numbers, so it can never be vacuously
    /// complete, but the guard keeps the rule safe for any grid.)
    pub fn row_complete(&self, row: usize) -> bool {
        let mut any = false;
        for cell in &self.cells[row] {
            if cell.value.is_some() {
                any = true;
                if !cell.marked {
                    return false;
                }
            }
        }
        any
    }

    /// Full house: every numbered cell on the ticket is marked.
    pub fn full_house(&self) -> bool {
        (0..ROWS).all(|r| self.row_complete(r))
    }

    /// Count of marked cells (UI convenience).
    pub fn marked_count(&self) -> usize {
        self.iter().filter(|(_, _, cell)| cell.marked).count()
    }
}
