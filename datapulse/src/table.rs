use crate::{DataColumn, Schedule, Value};

/// Minimal capability of a correlated tabular view: one timestamp schedule
/// plus same-size named columns. Everything else is derived by the free
/// helpers below.
pub trait DataTable {
    fn column_count(&self) -> usize;

    fn column_at(&self, index: usize) -> Option<&DataColumn>;

    fn column_by_name(&self, name: &str) -> Option<&DataColumn>;

    fn timestamps(&self) -> &Schedule;
}

/// Number of rows, taken from the timestamp schedule.
pub fn row_count(table: &(impl DataTable + ?Sized)) -> usize {
    table.timestamps().sample_count()
}

/// Column names in table order.
pub fn column_names(table: &(impl DataTable + ?Sized)) -> Vec<&str> {
    (0..table.column_count())
        .filter_map(|i| table.column_at(i))
        .map(|column| column.name.as_str())
        .collect()
}

/// One row of dynamic values across all columns, or `None` past the end.
pub fn row_values(table: &(impl DataTable + ?Sized), row: usize) -> Option<Vec<Value>> {
    if row >= row_count(table) {
        return None;
    }
    let mut out = Vec::with_capacity(table.column_count());
    for i in 0..table.column_count() {
        out.push(table.column_at(i)?.values.get(row)?);
    }
    Some(out)
}

/// Estimated in-memory size of all columns plus the schedule.
pub fn table_allocation(table: &(impl DataTable + ?Sized)) -> usize {
    let columns: usize = (0..table.column_count())
        .filter_map(|i| table.column_at(i))
        .map(DataColumn::allocation)
        .sum();
    columns + table.timestamps().encoded_size()
}
