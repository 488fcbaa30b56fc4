// Generated by sheet-master. Do not edit by hand; regenerate instead.

use sheet_master::{MasterTable, TypedBinder};

use super::character_master_data::CharacterMasterData;

pub const TABLE_NAME: &str = "CharacterMaster";
pub const SHEET_NAME: &str = "Character";
pub const SPREADSHEET_ID: &str = "sheet-123";
pub const SHEET_ID: &str = "0";

pub type CharacterMaster = MasterTable<TypedBinder<CharacterMasterData>>;

pub fn new_table() -> CharacterMaster {
    MasterTable::new(TABLE_NAME, TypedBinder::default())
        .with_source(SPREADSHEET_ID, SHEET_ID)
        .with_sheet_name(SHEET_NAME)
}
