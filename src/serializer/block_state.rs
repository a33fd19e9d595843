use crate::error::{Result, WorldError};
use crate::nbt::{Compound, Tag};

/// `minecraft:oak_log[axis=y]` to `{Name: "minecraft:oak_log", Properties: {axis: "y"}}`.
///
/// Properties are left out when there is no bracket section or it is empty;
/// pairs without exactly one `=` are dropped.
pub fn block_state_to_nbt(block_state: &str) -> Tag {
    let mut tag = Compound::new();

    let (name, properties) = match block_state.split_once('[') {
        Some((name, rest)) => (name, Some(rest.strip_suffix(']').unwrap_or(rest))),
        None => (block_state, None),
    };

    if let Some(properties) = properties.filter(|p| !p.is_empty()) {
        let mut props = Compound::new();
        for pair in properties.split(',') {
            let mut parts = pair.split('=');
            if let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
                props.insert(key.to_owned(), Tag::String(value.to_owned()));
            }
        }
        tag.insert("Properties".to_owned(), Tag::Compound(props));
    }

    tag.insert("Name".to_owned(), Tag::String(name.to_owned()));
    Tag::Compound(tag)
}

/// Inverse of [`block_state_to_nbt`]. Property order isn't stored in NBT, so
/// properties come back sorted by key.
pub fn block_state_from_nbt(tag: &Tag) -> Result<String> {
    let name = tag
        .get("Name")
        .and_then(Tag::as_string)
        .ok_or_else(|| WorldError::FormatError("palette entry without Name".to_owned()))?;

    let Some(properties) = tag.get("Properties").and_then(Tag::as_compound) else {
        return Ok(name.clone());
    };
    if properties.is_empty() {
        return Ok(name.clone());
    }

    let mut pairs: Vec<(&String, &Tag)> = properties.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut state = format!("{}[", name);
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        let value = value.as_string().ok_or_else(|| {
            WorldError::FormatError(format!("property {} of {} is not a string", key, name))
        })?;
        if i > 0 {
            state.push(',');
        }
        state.push_str(key);
        state.push('=');
        state.push_str(value);
    }
    state.push(']');
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(tag: &Tag) -> Option<&Compound> {
        tag.get("Properties").and_then(Tag::as_compound)
    }

    #[test]
    fn test_plain_block() {
        let tag = block_state_to_nbt("minecraft:stone");
        assert_eq!(tag.get("Name"), Some(&Tag::String("minecraft:stone".to_owned())));
        assert!(props(&tag).is_none());
    }

    #[test]
    fn test_properties() {
        let tag = block_state_to_nbt("minecraft:oak_log[axis=y]");
        assert_eq!(tag.get("Name").and_then(Tag::as_string).unwrap(), "minecraft:oak_log");
        let props = props(&tag).unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("axis"), Some(&Tag::String("y".to_owned())));

        let tag = block_state_to_nbt("minecraft:chest[facing=north,type=single,waterlogged=false]");
        assert_eq!(self::props(&tag).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_brackets_and_junk_pairs() {
        let tag = block_state_to_nbt("minecraft:stone[]");
        assert_eq!(tag.get("Name").and_then(Tag::as_string).unwrap(), "minecraft:stone");
        assert!(props(&tag).is_none());

        let tag = block_state_to_nbt("minecraft:lever[face=wall,broken,a=b=c]");
        let props = props(&tag).unwrap();
        assert_eq!(props.len(), 1);
        assert!(props.contains_key("face"));
    }

    #[test]
    fn test_from_nbt_sorts_properties() {
        let tag = block_state_to_nbt("minecraft:chest[type=single,facing=north]");
        assert_eq!(
            block_state_from_nbt(&tag).unwrap(),
            "minecraft:chest[facing=north,type=single]"
        );
        assert_eq!(
            block_state_from_nbt(&block_state_to_nbt("minecraft:air")).unwrap(),
            "minecraft:air"
        );
        assert!(block_state_from_nbt(&Tag::Compound(Compound::new())).is_err());
    }
}
