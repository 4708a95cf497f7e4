//! 值与文本帧之间的可插拔编解码。
//!
//! # 教案背景（Why）
//! - 引擎只要求“值进、文本出；文本进、值出”，序列化策略由调用方注入；
//! - 默认的 [`JsonCodec`] 基于 `serde_json`，覆盖绝大多数结构化消息场景。
//!
//! # 合约说明（What）
//! - `serialize` 失败返回 [`CodecError`]，引擎会把它包装为 [`crate::StreamError::Serialization`]，
//!   只让对应那次写入失败；
//! - `deserialize` 返回 `Ok(None)` 表示“解析成功但得到空值”，引擎将其与解析失败同等对待并销毁流。
//!
//! # 风险提示（Trade-offs）
//! - 编解码器应当无状态、无副作用：引擎实例之间共享同一个默认实例不会互相影响。

use core::fmt;
use core::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// 值 ↔ 文本帧的编解码契约。
pub trait Codec: 'static {
    /// 流中流动的值类型。
    type Item: 'static;

    /// 把值编码为一帧文本。
    fn serialize(&self, value: &Self::Item) -> Result<String, CodecError>;

    /// 把一帧文本解码为值；`Ok(None)` 表示空值。
    fn deserialize(&self, payload: &str) -> Result<Option<Self::Item>, CodecError>;
}

/// 基于 `serde_json` 的默认编解码器。
///
/// JSON `null` 解码为空值；`serde_json` 无法表示的值（例如键不是字符串的映射）在编码时失败。
pub struct JsonCodec<T = serde_json::Value>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    /// 构造编解码器。
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    type Item = T;

    fn serialize(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|err| CodecError::serialize(err.to_string()))
    }

    fn deserialize(&self, payload: &str) -> Result<Option<T>, CodecError> {
        serde_json::from_str::<Option<T>>(payload)
            .map_err(|err| CodecError::deserialize(err.to_string()))
    }
}

/// 原样透传文本的编解码器。
#[derive(Clone, Copy, Debug, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    type Item = String;

    fn serialize(&self, value: &String) -> Result<String, CodecError> {
        Ok(value.clone())
    }

    fn deserialize(&self, payload: &str) -> Result<Option<String>, CodecError> {
        Ok(Some(payload.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::Serializer;
    use serde_json::json;

    use super::*;
    use crate::error::CodecErrorKind;

    /// 代表性取值（对象、数组、嵌套结构、数字、字符串）编码后再解码保持不变。
    #[test]
    fn json_round_trips_representative_values() {
        let codec = JsonCodec::<serde_json::Value>::default();
        for value in [
            json!({"a": 1}),
            json!([1, "two", 3.5]),
            json!({"outer": {"inner": [true, false, {"deep": "yes"}]}}),
            json!(42),
            json!("plain string"),
        ] {
            let wire = codec.serialize(&value).expect("编码应成功");
            let back = codec.deserialize(&wire).expect("解码应成功");
            assert_eq!(back, Some(value));
        }
    }

    #[test]
    fn json_null_decodes_to_absent_and_garbage_fails() {
        let codec = JsonCodec::<serde_json::Value>::default();
        assert_eq!(codec.deserialize("null"), Ok(None));

        let err = codec.deserialize("{not json").expect_err("非法 JSON 必须失败");
        assert_eq!(err.kind(), CodecErrorKind::Deserialize);
    }

    #[test]
    fn unrepresentable_values_fail_instead_of_panicking() {
        let codec = JsonCodec::<BTreeMap<(u8, u8), u8>>::default();
        let mut map = BTreeMap::new();
        map.insert((1, 2), 3);
        let err = codec.serialize(&map).expect_err("非字符串键无法编码为 JSON");
        assert_eq!(err.kind(), CodecErrorKind::Serialize);

        struct Opaque;
        impl Serialize for Opaque {
            fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("opaque handle cannot be serialized"))
            }
        }
        impl<'de> serde::Deserialize<'de> for Opaque {
            fn deserialize<D: serde::Deserializer<'de>>(_: D) -> Result<Self, D::Error> {
                Err(serde::de::Error::custom("opaque handle cannot be deserialized"))
            }
        }
        let err = JsonCodec::<Opaque>::default()
            .serialize(&Opaque)
            .expect_err("自定义失败必须透传");
        assert!(err.message().contains("opaque handle"));
    }

    #[test]
    fn text_codec_is_a_passthrough() {
        let codec = TextCodec;
        assert_eq!(codec.serialize(&"hi".to_owned()), Ok("hi".to_owned()));
        assert_eq!(codec.deserialize("null"), Ok(Some("null".to_owned())));
    }
}
