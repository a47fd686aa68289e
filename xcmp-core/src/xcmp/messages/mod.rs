mod device_init_status;
mod display_text;
mod softpot;

pub use device_init_status::{AttributeEntry, DeviceInitStatus, InitType};
pub use display_text::{DisplayTextMessage, DisplayTimer, DisplayUpdateQuery, TextEncoding, PRIMARY_ID, PRIMARY_REGION};
pub use softpot::{SoftpotMessage, SoftpotOperation, SoftpotValue};
