// Generated by sheet-master. Do not edit by hand; regenerate instead.

use std::fmt;

use sheet_master::{BindResult, CellReader, MasterRecord};
use crate::types::Gender;

pub const COLUMN_ID: usize = 0;
pub const COLUMN_NAME: usize = 1;
pub const COLUMN_HP: usize = 3;
pub const COLUMN_SPEED: usize = 4;
pub const COLUMN_ALIVE: usize = 5;
pub const COLUMN_GENDER: usize = 6;
pub const COLUMN_MAX: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterMasterData {
    pub id: i64,
    pub name: String,
    pub hp: i64,
    pub speed: f64,
    pub alive: bool,
    pub gender: Gender,
}

impl MasterRecord for CharacterMasterData {
    fn bind(cells: &mut CellReader<'_>) -> BindResult<Self> {
        Ok(Self {
            id: cells.get_int(COLUMN_ID),
            name: cells.get_string(COLUMN_NAME),
            hp: cells.get_int(COLUMN_HP),
            speed: cells.get_float(COLUMN_SPEED),
            alive: cells.get_bool(COLUMN_ALIVE),
            gender: cells.get_enum(COLUMN_GENDER, Gender::default()),
        })
    }

    fn key(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for CharacterMasterData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharacterMasterData [id={}, name={}, hp={}, speed={}, alive={}, gender={:?}]", self.id, self.name, self.hp, self.speed, self.alive, self.gender)
    }
}
