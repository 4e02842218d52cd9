//! Boolean to text encoding

use crate::{Error, Result};

/**
    Maps booleans to a pair of text codes for columns that store them as characters.

    The default encoding is `"Y"`/`"N"`.

    # Example

    ```
    use augur::BoolEncoding;

    let enc = BoolEncoding::new("t", "f");
    assert_eq!(enc.encode(true), "t");
    assert_eq!(enc.decode("f")?, false);
    assert!(enc.decode("Y").is_err());

    let yn = BoolEncoding::default();
    assert_eq!(yn.encode(false), "N");
    assert_eq!(yn.decode("Y")?, true);
    # Ok::<(),augur::Error>(())
    ```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolEncoding {
    true_code:  String,
    false_code: String,
}

impl Default for BoolEncoding {
    fn default() -> Self {
        Self::new("Y", "N")
    }
}

impl BoolEncoding {
    pub fn new(true_code: &str, false_code: &str) -> Self {
        Self { true_code: true_code.to_string(), false_code: false_code.to_string() }
    }

    pub fn encode(&self, val: bool) -> &str {
        if val { &self.true_code } else { &self.false_code }
    }

    /// Decodes text that was encoded by this encoding. Trailing blanks of `CHAR` columns are ignored.
    pub fn decode(&self, txt: &str) -> Result<bool> {
        let txt = txt.trim_end();
        if txt == self.true_code {
            Ok(true)
        } else if txt == self.false_code {
            Ok(false)
        } else {
            Err(Error::mismatch(format!("{:?} is neither {:?} nor {:?}", txt, self.true_code, self.false_code)))
        }
    }
}
