//! LCS billboard codec
//!
//! LCS signs display pre-provisioned item slots; the frame only references a
//! slot number, it never carries text. The directive geometry is fixed by the
//! panel hardware.

use super::charset::to_euc_kr;
use crate::error::{FieldError, Result};

/// Encode a fixed-size-item directive for a pre-provisioned slot
pub fn encode(item_number: &str) -> Result<Vec<u8>> {
    let item = item_number.trim();
    if item.is_empty() {
        return Err(FieldError::protocol("LCS item number is empty"));
    }

    let frame = format!(
        "[SnrLoad]\r[SnrInit]\r[Page999 pWait 0,30]\r\
         [Ln99 Xp0 Yp0 Xs64 Ys96][Fw32 Fh96][Item{item}]\r\
         [SnrEnd]\r[SnrSave]\r"
    );

    to_euc_kr(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_frame() {
        let frame = encode("12").unwrap();
        let text = String::from_utf8(frame).unwrap();
        assert_eq!(
            text,
            "[SnrLoad]\r[SnrInit]\r[Page999 pWait 0,30]\r\
             [Ln99 Xp0 Yp0 Xs64 Ys96][Fw32 Fh96][Item12]\r\
             [SnrEnd]\r[SnrSave]\r"
        );
    }

    #[test]
    fn test_empty_item_rejected() {
        assert!(matches!(
            encode("").unwrap_err(),
            FieldError::ProtocolError(_)
        ));
        assert!(encode("   ").is_err());
    }
}
