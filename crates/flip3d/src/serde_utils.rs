//! Serde utilities for glam types.

use glam::Vec3;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde proxy for Vec3
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3Def {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Vec3Def {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Def> for Vec3 {
    fn from(def: Vec3Def) -> Self {
        Vec3::new(def.x, def.y, def.z)
    }
}

pub fn serialize_vec3<S>(v: &Vec3, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    Vec3Def::from(*v).serialize(s)
}

pub fn deserialize_vec3<'de, D>(d: D) -> Result<Vec3, D::Error>
where
    D: Deserializer<'de>,
{
    Vec3Def::deserialize(d).map(Vec3::from)
}

/// `#[serde(with = "vec3_list")]` for `Vec<Vec3>`.
pub mod vec3_list {
    use super::*;

    pub fn serialize<S>(list: &[Vec3], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let proxies: Vec<Vec3Def> = list.iter().map(|&v| v.into()).collect();
        proxies.serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Vec<Vec3>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<Vec3Def>::deserialize(d).map(|list| list.into_iter().map(Vec3::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        v: Vec3,
        #[serde(with = "vec3_list")]
        list: Vec<Vec3>,
    }

    #[test]
    fn test_vec3_json_shape() {
        let h = Holder {
            v: Vec3::new(1.0, 2.0, 3.0),
            list: vec![Vec3::X, Vec3::Y],
        };
        let json = serde_json::to_string(&h).unwrap();
        assert!(json.contains("\"v\":{\"x\":1.0,\"y\":2.0,\"z\":3.0}"), "{}", json);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.v, h.v);
        assert_eq!(back.list, h.list);
    }
}
