//! String-keyed metadata tables stored in the alignment container.
//!
//! Each [`MetaData`] object corresponds to a group of rows in table `MetaData`.
//! The group is loaded eagerly and written back only if it has been modified.

use crate::Result;

use std::collections::BTreeMap;

use rusqlite::Connection;

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// A string-keyed, string-valued table belonging to a single group.
///
/// # Examples
///
/// ```
/// use hal_base::MetaData;
///
/// let mut metadata = MetaData::new("Meta");
/// assert!(metadata.is_empty());
/// metadata.set("assembly", "hg38");
/// assert_eq!(metadata.get("assembly"), Some("hg38"));
/// assert!(metadata.is_dirty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaData {
    group: String,
    values: BTreeMap<String, String>,
    dirty: bool,
}

impl MetaData {
    /// Creates an empty metadata table for the given group.
    pub fn new(group: &str) -> Self {
        MetaData {
            group: group.to_string(),
            values: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Loads the group from the container.
    ///
    /// A group without rows is an empty table.
    /// Passes through any database errors.
    pub fn load(connection: &Connection, group: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        let mut statement = connection.prepare(
            "SELECT key, value FROM MetaData WHERE grp = ?1"
        )?;
        let mut rows = statement.query((group,))?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            values.insert(key, value);
        }
        Ok(MetaData {
            group: group.to_string(),
            values,
            dirty: false,
        })
    }

    /// Returns `true` if the group has rows in the container.
    pub fn group_exists(connection: &Connection, group: &str) -> Result<bool> {
        let count: usize = connection.query_row(
            "SELECT COUNT(*) FROM MetaData WHERE grp = ?1",
            (group,),
            |row| row.get(0)
        )?;
        Ok(count > 0)
    }

    /// Deletes all rows of the group from the container.
    pub fn delete_group(connection: &Connection, group: &str) -> Result<()> {
        connection.execute("DELETE FROM MetaData WHERE grp = ?1", (group,))?;
        Ok(())
    }

    /// Returns the name of the group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the value for the key, or [`None`] if there is no such key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|x| x.as_str())
    }

    /// Returns `true` if the key exists.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Sets the value for the key.
    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        self.dirty = true;
    }

    /// Removes the key and returns the old value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let result = self.values.remove(key);
        if result.is_some() {
            self.dirty = true;
        }
        result
    }

    /// Returns an iterator over the key-value pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` if the table has been modified since it was loaded or written.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the table back to the container if it has been modified.
    ///
    /// The stored group is replaced with the current contents.
    /// Passes through any database errors.
    pub fn write(&mut self, connection: &Connection) -> Result<()> {
        self.store(connection)?;
        self.dirty = false;
        Ok(())
    }

    // Writes the table if it has been modified but leaves the dirty flag unchanged.
    pub(crate) fn store(&self, connection: &Connection) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let transaction = connection.unchecked_transaction()?;
        {
            transaction.execute("DELETE FROM MetaData WHERE grp = ?1", (&self.group,))?;
            let mut insert = transaction.prepare(
                "INSERT INTO MetaData(grp, key, value) VALUES (?1, ?2, ?3)"
            )?;
            for (key, value) in self.values.iter() {
                insert.execute((&self.group, key, value))?;
            }
        }
        transaction.commit()?;
        Ok(())
    }
}

//-----------------------------------------------------------------------------
