#[macro_use]
pub mod block;

pub mod computer;
pub mod conversation;
pub mod entry;
pub mod fvf;
pub mod fvf_video;
pub mod object;
pub mod object_id;
pub mod resources;
pub mod screen;
pub mod trigger;

pub use block::{BlockReader, BlockWriter, CorruptAsset, is_corrupt};
pub use computer::{COMPUTER_DB_FILE_NAME, ComputerDatabase, ComputerEntry};
pub use conversation::{
    ChangeAction, ConversationFile, ResponseBlock, ResponseRecord, ResponseState, TextBlock,
    conversation_file_name,
};
pub use entry::{Entry, EntryList};
pub use fvf::{FvfFrame, FvfHeader, FvfReader, write_fvf};
pub use fvf_video::FvfVideoDecoder;
pub use object::{Description, ObjectRecord, WalkType};
pub use object_id::ObjectId;
pub use resources::{DataDir, MemoryResources, ReadSeek, ResourceProvider};
pub use screen::{Polygon, ScreenList, read_polygons, read_screen_objects};
pub use trigger::{TRIGGERS_FILE_NAME, TriggerRecord, TriggerType, read_triggers, write_triggers};
