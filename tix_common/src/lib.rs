mod money;

pub mod op;

pub use money::{Money, MoneyConversionError, TICKET_CURRENCY_CODE, TICKET_CURRENCY_CODE_LOWER};
