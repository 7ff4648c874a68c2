#![forbid(unsafe_code)]

use super::*;

impl SqliteStore {
    pub fn unit_variable(
        &self,
        unittype: &str,
        variable: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM unit_variables WHERE unittype=?1 AND variable=?2",
                params![unittype, variable],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }

    pub fn set_unit_variable(
        &mut self,
        unittype: &str,
        variable: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        if unittype.trim().is_empty() || variable.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "unittype and variable must not be empty",
            ));
        }

        self.conn.execute(
            "INSERT INTO unit_variables(unittype, variable, value, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(unittype, variable) DO UPDATE SET value=excluded.value, updated_at_ms=excluded.updated_at_ms",
            params![unittype, variable, value, now_ms()],
        )?;
        Ok(())
    }
}
