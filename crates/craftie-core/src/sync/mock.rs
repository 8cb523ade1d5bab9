//! In-memory [`SheetsApi`] double for sink tests.

use std::cell::{Cell, RefCell};

use super::SheetsApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Update(String, Vec<Vec<String>>),
    Append(String, Vec<Vec<String>>),
}

#[derive(Debug, thiserror::Error)]
#[error("mock sheets failure")]
pub struct MockError;

/// Records every call; appends land on consecutive rows after the header.
#[derive(Debug, Default)]
pub struct MockSheets {
    calls: RefCell<Vec<Call>>,
    header: RefCell<Vec<Vec<String>>>,
    rows: Cell<u32>,
    failing: Cell<bool>,
}

impl MockSheets {
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    pub fn with_header(header: Vec<String>) -> Self {
        let mock = Self::default();
        *mock.header.borrow_mut() = vec![header];
        mock
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn append_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, Call::Append(..)))
            .count()
    }

    fn check(&self) -> Result<(), MockError> {
        if self.failing.get() {
            Err(MockError)
        } else {
            Ok(())
        }
    }
}

impl SheetsApi for MockSheets {
    type Error = MockError;

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, MockError> {
        self.calls.borrow_mut().push(Call::Get(range.to_string()));
        self.check()?;
        Ok(self.header.borrow().clone())
    }

    async fn update_values(&self, range: &str, rows: &[Vec<String>]) -> Result<(), MockError> {
        self.calls
            .borrow_mut()
            .push(Call::Update(range.to_string(), rows.to_vec()));
        self.check()?;
        if range.ends_with("A1:G1") {
            *self.header.borrow_mut() = rows.to_vec();
        }
        Ok(())
    }

    async fn append_values(&self, range: &str, rows: &[Vec<String>]) -> Result<String, MockError> {
        self.calls
            .borrow_mut()
            .push(Call::Append(range.to_string(), rows.to_vec()));
        self.check()?;
        let first = self.rows.get() + 2;
        let count = u32::try_from(rows.len()).unwrap();
        self.rows.set(self.rows.get() + count);
        let last = first + count - 1;
        Ok(format!("'Crafts'!A{first}:G{last}"))
    }
}
