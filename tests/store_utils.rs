#![allow(dead_code)]

use recordkv::{
    FlushObserver, FlushReport, FlushTrigger, KvError, Record, RecordId, VALUE_FIELD, Value,
    ValueCodec, WriteKind,
};
use std::sync::Mutex;

/// Collects everything the coalescer reports.
#[derive(Default)]
pub struct RecordingObserver {
    failures: Mutex<Vec<(RecordId, WriteKind, KvError)>>,
    reports: Mutex<Vec<FlushReport>>,
}

impl RecordingObserver {
    pub fn failures(&self) -> Vec<(RecordId, WriteKind, KvError)> {
        self.failures.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<FlushReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn triggers(&self) -> Vec<FlushTrigger> {
        self.reports().iter().map(|r| r.trigger).collect()
    }
}

impl FlushObserver for RecordingObserver {
    fn write_failed(&self, id: &RecordId, kind: WriteKind, error: &KvError) {
        self.failures
            .lock()
            .unwrap()
            .push((id.clone(), kind, error.clone()));
    }

    fn flush_completed(&self, report: &FlushReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

pub fn id(name: &str) -> RecordId {
    RecordId::new(name).unwrap()
}

/// A per-key record holding `value`.
pub fn value_record(name: &str, value: impl Into<Value>) -> Record {
    let mut record = Record::new(id(name), "Value");
    record.set_field(
        VALUE_FIELD,
        ValueCodec::MessagePack.encode(&value.into()).unwrap(),
    );
    record
}

pub fn decode_field(record: &Record, field: &str) -> Option<Value> {
    record
        .field(field)
        .map(|bytes| ValueCodec::decode(bytes).unwrap())
}
