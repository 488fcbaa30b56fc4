use std::{
    collections::{HashMap, hash_map::Entry},
    ops::ControlFlow,
};

use log::{debug, error};

use crate::{
    binder::{CellReader, RecordBinder},
    csv_table::Row,
    error::{SheetError, SheetResult},
    import_log::ImportLog,
    source::SheetRef,
};

/// Keyed, insertion-ordered store of records bound from one sheet.
///
/// Duplicate keys keep the first record seen. An import stages the new
/// records and swaps them in only after every row bound, so a failed import
/// leaves the previous contents in place.
pub struct MasterTable<B: RecordBinder> {
    name: String,
    binder: B,
    records: Vec<B::Record>,
    index: HashMap<i64, usize>,
    spreadsheet_id: String,
    spreadsheet_id_override: Option<String>,
    sheet_id: String,
    sheet_name: String,
}

impl<B: RecordBinder + Default> Default for MasterTable<B> {
    fn default() -> Self {
        Self::new("", B::default())
    }
}

impl<B: RecordBinder> MasterTable<B> {
    pub fn new(name: impl Into<String>, binder: B) -> Self {
        Self {
            name: name.into(),
            binder,
            records: Vec::new(),
            index: HashMap::new(),
            spreadsheet_id: String::new(),
            spreadsheet_id_override: None,
            sheet_id: String::new(),
            sheet_name: String::new(),
        }
    }

    pub fn with_source(mut self, spreadsheet_id: &str, sheet_id: &str) -> Self {
        self.spreadsheet_id = spreadsheet_id.to_string();
        self.sheet_id = sheet_id.to_string();
        self
    }

    pub fn with_sheet_name(mut self, sheet_name: &str) -> Self {
        self.sheet_name = sheet_name.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binder(&self) -> &B {
        &self.binder
    }

    pub fn sheet_id(&self) -> &str {
        &self.sheet_id
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Address of the tab this table imports from, honoring the override.
    pub fn sheet_ref(&self) -> SheetRef {
        SheetRef::new(self.spreadsheet_id(), &self.sheet_id, &self.sheet_name)
    }

    /// The override when set, otherwise the id the table was generated with.
    pub fn spreadsheet_id(&self) -> &str {
        self.spreadsheet_id_override
            .as_deref()
            .unwrap_or(&self.spreadsheet_id)
    }

    pub fn default_spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn override_spreadsheet_id(&mut self, spreadsheet_id: impl Into<String>) {
        self.spreadsheet_id_override = Some(spreadsheet_id.into());
    }

    pub fn clear_spreadsheet_id_override(&mut self) {
        self.spreadsheet_id_override = None;
    }

    pub fn is_spreadsheet_id_overridden(&self) -> bool {
        self.spreadsheet_id_override.is_some()
    }

    /// Replaces the table contents with records bound from `rows`.
    ///
    /// Per-cell problems and duplicate keys are recorded in `log`. A binder
    /// error aborts the run with [`SheetError::ImportAborted`] and the table
    /// keeps what it held before.
    pub fn import(&mut self, rows: &[Row], log: &mut ImportLog) -> SheetResult<usize> {
        let threshold = log.threshold();
        log.initialize(&self.name, rows.len(), threshold);
        self.binder.pre_import();

        let mut staged: Vec<B::Record> = Vec::with_capacity(rows.len());
        let mut index = HashMap::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            log.begin_record();
            let bound = {
                let mut cells = CellReader::new(row, log);
                self.binder.bind(&mut cells)
            };
            let record = match bound {
                Ok(record) => record,
                Err(err) => {
                    let cause = format!("{err:#}");
                    log.aborted(&cause);
                    error!(
                        "Import of '{}' aborted at row {}: {cause}",
                        self.name,
                        row_idx + 1
                    );
                    return Err(SheetError::ImportAborted(cause));
                }
            };
            let key = self.binder.key(&record);
            match index.entry(key) {
                Entry::Occupied(_) => {
                    log.duplicate_key(key);
                    log.skip_record();
                }
                Entry::Vacant(slot) => {
                    slot.insert(staged.len());
                    log.end_record(&record);
                    staged.push(record);
                }
            }
        }

        self.records = staged;
        self.index = index;
        self.binder.post_import(&self.records);
        debug!("Imported {} record(s) into '{}'", self.records.len(), self.name);
        Ok(self.records.len())
    }

    pub fn get(&self, key: i64) -> Option<&B::Record> {
        self.index.get(&key).map(|&idx| &self.records[idx])
    }

    pub fn get_by_index(&self, index: usize) -> Option<&B::Record> {
        self.records.get(index)
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.index.contains_key(&key)
    }

    /// First record in insertion order matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<&B::Record>
    where
        P: FnMut(&B::Record) -> bool,
    {
        self.records.iter().find(|record| predicate(record))
    }

    pub fn find_all<P>(&self, mut predicate: P) -> Vec<&B::Record>
    where
        P: FnMut(&B::Record) -> bool,
    {
        self.records.iter().filter(|record| predicate(record)).collect()
    }

    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&B::Record),
    {
        self.records.iter().for_each(f);
    }

    /// Visits records in order until `f` breaks.
    pub fn try_for_each<F>(&self, mut f: F) -> ControlFlow<()>
    where
        F: FnMut(&B::Record) -> ControlFlow<()>,
    {
        for record in &self.records {
            f(record)?;
        }
        ControlFlow::Continue(())
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, B::Record> {
        self.records.iter()
    }

    pub fn records(&self) -> &[B::Record] {
        &self.records
    }
}

impl<'a, B: RecordBinder> IntoIterator for &'a MasterTable<B> {
    type Item = &'a B::Record;
    type IntoIter = std::slice::Iter<'a, B::Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
