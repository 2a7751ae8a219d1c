//! In-memory settings store and provider for tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::{SettingsProvider, SettingsStore};
use crate::constants::signals::CHANGED;
use crate::error::{ConnectError, SettingsError};
use crate::signals::{Handler, SignalId, Signals, Subscribable};

const SIGNAL_NAMES: &[&str] = &[CHANGED];

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Double(f64),
    Int(i32),
    Str(String),
}

/// Writes notify on a later loop turn, like a real settings backend
pub struct MemorySettings {
    schema: String,
    values: RefCell<HashMap<String, Value>>,
    signals: Rc<Signals>,
    writes: RefCell<Vec<String>>,
    fail_writes: Cell<bool>,
}

impl MemorySettings {
    pub fn new(schema: &str) -> Rc<Self> {
        Rc::new(Self {
            schema: schema.to_string(),
            values: RefCell::new(HashMap::new()),
            signals: Rc::new(Signals::new(SIGNAL_NAMES)),
            writes: RefCell::new(Vec::new()),
            fail_writes: Cell::new(false),
        })
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Keys written so far, in order
    pub fn writes(&self) -> Vec<String> {
        self.writes.borrow().clone()
    }

    pub fn handler_count(&self) -> usize {
        self.signals.handler_count()
    }

    fn read<T>(&self, key: &str, extract: impl FnOnce(&Value) -> Option<T>) -> Result<T, SettingsError> {
        let values = self.values.borrow();
        let value = values.get(key).ok_or_else(|| SettingsError::Command {
            action: "get",
            schema: self.schema.clone(),
            key: key.to_string(),
            stderr: "No such key".to_string(),
        })?;
        extract(value).ok_or_else(|| SettingsError::Parse {
            schema: self.schema.clone(),
            key: key.to_string(),
            value: format!("{value:?}"),
        })
    }

    fn write(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        if self.fail_writes.get() {
            return Err(SettingsError::Command {
                action: "set",
                schema: self.schema.clone(),
                key: key.to_string(),
                stderr: "write refused".to_string(),
            });
        }
        self.values.borrow_mut().insert(key.to_string(), value);
        self.writes.borrow_mut().push(key.to_string());

        let signals = Rc::downgrade(&self.signals);
        tokio::task::spawn_local(async move {
            if let Some(signals) = signals.upgrade() {
                signals.emit(CHANGED);
            }
        });
        Ok(())
    }
}

impl Subscribable for MemorySettings {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}

impl SettingsStore for MemorySettings {
    fn boolean(&self, key: &str) -> Result<bool, SettingsError> {
        self.read(key, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })
    }

    fn double(&self, key: &str) -> Result<f64, SettingsError> {
        self.read(key, |v| match v {
            Value::Double(d) => Some(*d),
            _ => None,
        })
    }

    fn int(&self, key: &str) -> Result<i32, SettingsError> {
        self.read(key, |v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })
    }

    fn string(&self, key: &str) -> Result<String, SettingsError> {
        self.read(key, |v| match v {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        })
    }

    fn set_boolean(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.write(key, Value::Bool(value))
    }

    fn set_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
        self.write(key, Value::Double(value))
    }

    fn set_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.write(key, Value::Int(value))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.write(key, Value::Str(value.to_string()))
    }
}

/// Hands out one shared `MemorySettings` per schema id
#[derive(Default)]
pub struct MemoryProvider {
    stores: RefCell<HashMap<String, Rc<MemorySettings>>>,
    opened: RefCell<Vec<String>>,
}

impl MemoryProvider {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// The store for `schema`, created empty on first use
    pub fn store(&self, schema: &str) -> Rc<MemorySettings> {
        self.stores
            .borrow_mut()
            .entry(schema.to_string())
            .or_insert_with(|| MemorySettings::new(schema))
            .clone()
    }

    /// Schemas opened through the provider trait, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }
}

impl SettingsProvider for MemoryProvider {
    fn open(&self, schema: &str) -> Rc<dyn SettingsStore> {
        self.opened.borrow_mut().push(schema.to_string());
        self.store(schema)
    }

    fn open_watched(&self, schema: &str) -> Result<Rc<dyn SettingsStore>, SettingsError> {
        Ok(self.open(schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run_local, settle};

    #[test]
    fn test_write_notifies_on_a_later_turn() {
        run_local(async {
            let settings = MemorySettings::new("test.schema");
            let hits = Rc::new(Cell::new(0));
            let handler = {
                let hits = hits.clone();
                Rc::new(move || hits.set(hits.get() + 1))
            };
            settings.connect(CHANGED, handler).unwrap();

            settings.set_double("k", 1.5).unwrap();
            assert_eq!(hits.get(), 0);
            assert_eq!(settings.double("k").unwrap(), 1.5);

            settle().await;
            assert_eq!(hits.get(), 1);
            assert_eq!(settings.writes(), vec!["k".to_string()]);
        });
    }

    #[test]
    fn test_missing_and_mistyped_keys_are_errors() {
        let settings = MemorySettings::new("test.schema");
        assert!(matches!(settings.boolean("missing"), Err(SettingsError::Command { .. })));

        settings.values.borrow_mut().insert("k".to_string(), Value::Int(3));
        assert!(matches!(settings.string("k"), Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn test_failed_write_leaves_value_untouched() {
        let settings = MemorySettings::new("test.schema");
        settings.values.borrow_mut().insert("k".to_string(), Value::Int(3));
        settings.fail_writes(true);

        assert!(settings.set_int("k", 4).is_err());
        assert_eq!(settings.int("k").unwrap(), 3);
        assert!(settings.writes().is_empty());
    }
}
