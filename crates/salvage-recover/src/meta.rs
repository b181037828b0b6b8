//! Meta-mode output: labels and comments extracted from the wallet body.

use salvage_wallet::EntryType;

/// One comment record as found in the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentRecord {
    pub dtype: EntryType,
    /// hash160 of the commented address, or the 32-byte txid.
    pub key: Vec<u8>,
    pub text: Vec<u8>,
}

/// Everything Meta mode extracts. No wallet is written; this is the return
/// value instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommentMap {
    pub short_label: String,
    pub long_label: String,
    /// Chained address entries seen while walking the body.
    pub naddress: usize,
    pub ncomments: usize,
    pub comments: Vec<CommentRecord>,
}

impl CommentMap {
    /// JSON presentation: the fixed keys plus one integer-indexed object
    /// per comment.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("shortLabel".into(), self.short_label.clone().into());
        map.insert("longLabel".into(), self.long_label.clone().into());
        map.insert("naddress".into(), self.naddress.into());
        map.insert("ncomments".into(), self.ncomments.into());
        for (index, comment) in self.comments.iter().enumerate() {
            let kind = match comment.dtype {
                EntryType::TxComment => "txn",
                _ => "addr",
            };
            map.insert(
                index.to_string(),
                serde_json::json!({
                    "type": kind,
                    "key": hex::encode(&comment.key),
                    "comment": String::from_utf8_lossy(&comment.text),
                }),
            );
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_matches_contract() {
        let map = CommentMap {
            short_label: "spend".into(),
            long_label: "daily spending wallet".into(),
            naddress: 12,
            ncomments: 2,
            comments: vec![
                CommentRecord {
                    dtype: EntryType::AddrComment,
                    key: vec![0xaa; 20],
                    text: b"groceries".to_vec(),
                },
                CommentRecord {
                    dtype: EntryType::TxComment,
                    key: vec![0xbb; 32],
                    text: b"refund".to_vec(),
                },
            ],
        };
        let json = map.to_json();
        assert_eq!(json["shortLabel"], "spend");
        assert_eq!(json["naddress"], 12);
        assert_eq!(json["ncomments"], 2);
        assert_eq!(json["0"]["type"], "addr");
        assert_eq!(json["0"]["comment"], "groceries");
        assert_eq!(json["1"]["type"], "txn");
        assert_eq!(json["1"]["key"], hex::encode([0xbb; 32]));
    }
}
