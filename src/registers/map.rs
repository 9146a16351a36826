use log::{debug, warn};
use std::collections::BTreeMap;

use super::entry::RegisterEntry;
use crate::utils::error::AcquisitionError;

pub const MAX_SLAVES: usize = 4;
pub const MAX_ENTRIES_PER_SLAVE: usize = 20;
/// Upper bound on channels carried by one sample.
pub const MAX_CHANNELS: usize = 8;

/// Validated register layout for one acquisition session.
///
/// Entries are kept in (slave, address) order. That order is the bus read
/// order and the channel order of published samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterMap {
    entries: Vec<RegisterEntry>,
}

impl RegisterMap {
    pub fn new(mut entries: Vec<RegisterEntry>) -> Result<Self, AcquisitionError> {
        entries.sort_by_key(|e| (e.slave_id, e.address));

        let mut per_slave: BTreeMap<u8, Vec<&RegisterEntry>> = BTreeMap::new();
        for entry in &entries {
            if entry.slave_id == 0 || entry.slave_id as usize > MAX_SLAVES {
                return Err(AcquisitionError::ConfigurationInvalid(format!(
                    "Slave id {} out of range 1-{}",
                    entry.slave_id, MAX_SLAVES
                )));
            }
            per_slave.entry(entry.slave_id).or_default().push(entry);
        }

        for (slave_id, slave_entries) in &per_slave {
            if slave_entries.len() > MAX_ENTRIES_PER_SLAVE {
                return Err(AcquisitionError::ConfigurationInvalid(format!(
                    "Slave {} has {} entries, at most {} allowed",
                    slave_id,
                    slave_entries.len(),
                    MAX_ENTRIES_PER_SLAVE
                )));
            }

            let mut previous: Option<(&RegisterEntry, u16)> = None;
            for entry in slave_entries {
                let last = entry.last_address().ok_or_else(|| {
                    AcquisitionError::ConfigurationInvalid(format!(
                        "Entry {} runs past register 0xFFFF",
                        entry
                    ))
                })?;

                if let Some((prev, prev_last)) = previous {
                    if entry.address <= prev_last {
                        return Err(AcquisitionError::ConfigurationInvalid(format!(
                            "Entry {} overlaps {}",
                            entry, prev
                        )));
                    }
                }
                previous = Some((entry, last));
            }
        }

        let enabled = entries.iter().filter(|e| e.enabled).count();
        if enabled > MAX_CHANNELS {
            return Err(AcquisitionError::ConfigurationInvalid(format!(
                "{} enabled entries, at most {} channels supported",
                enabled, MAX_CHANNELS
            )));
        }

        for entry in entries.iter_mut() {
            if entry.channel_name.trim().is_empty() {
                entry.channel_name = format!("S{}_{}", entry.slave_id, entry.address);
                debug!("Named unnamed entry {}", entry);
            }
        }

        if enabled == 0 && !entries.is_empty() {
            warn!("⚠️  Register map has {} entries but none enabled", entries.len());
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RegisterEntry] {
        &self.entries
    }

    /// Enabled entries in read order.
    pub fn enabled(&self) -> impl Iterator<Item = &RegisterEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.enabled().map(|e| e.channel_name.clone()).collect()
    }

    pub fn slave_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.entries.iter().map(|e| e.slave_id).collect();
        ids.dedup();
        ids
    }

    pub fn entries_for_slave(&self, slave_id: u8) -> impl Iterator<Item = &RegisterEntry> {
        self.entries.iter().filter(move |e| e.slave_id == slave_id)
    }
}
