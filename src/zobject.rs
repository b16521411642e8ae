use log::{debug, trace};

use crate::error::VmFailure;
use crate::header::{offsets, HEADER_SIZE};
use crate::memory::MemoryBuffer;
use crate::text::TextCodec;
use crate::version::VersionSpec;

// Pointer byte offsets inside an object record.
const SMALL_PARENT: usize = 4;
const SMALL_SIBLING: usize = 5;
const SMALL_CHILD: usize = 6;
const SMALL_PROPERTIES: usize = 7;
const LARGE_PARENT: usize = 6;
const LARGE_SIBLING: usize = 8;
const LARGE_CHILD: usize = 10;
const LARGE_PROPERTIES: usize = 12;

/// Version-aware accessors over the object database embedded in the
/// story image.
///
/// V1-3 records are 9 bytes: 32 attribute bits, three one-byte pointers,
/// a property-table word. V4+ records are 14 bytes: 48 attribute bits and
/// u16 pointers. The property-defaults table immediately precedes the
/// records.
pub struct ObjectTree {
    version: VersionSpec,
    defaults_addr: usize,
    tree_base: usize,
}

impl ObjectTree {
    pub fn new(memory: &MemoryBuffer, version: VersionSpec) -> Result<ObjectTree, VmFailure> {
        let defaults_addr = memory.get_u16(offsets::OBJECT_TABLE)? as usize;
        if defaults_addr < HEADER_SIZE {
            return Err(VmFailure::HeaderViolation(format!(
                "object table at {defaults_addr:#06x} starts inside the header"
            )));
        }
        let tree_base = defaults_addr + version.max_properties as usize * 2;
        debug!(
            "object tree at {:#06x} (defaults at {:#06x})",
            tree_base, defaults_addr
        );
        Ok(ObjectTree {
            version,
            defaults_addr,
            tree_base,
        })
    }

    fn max_object(&self) -> u16 {
        if self.version.large_objects {
            u16::MAX
        } else {
            255
        }
    }

    fn object_addr(&self, object: u16) -> Result<usize, VmFailure> {
        if object == 0 || object > self.max_object() {
            return Err(VmFailure::BadObject { number: object });
        }
        Ok(self.tree_base + (object as usize - 1) * self.version.object_entry_size)
    }

    fn read_link(&self, memory: &MemoryBuffer, object: u16, small: usize, large: usize)
        -> Result<u16, VmFailure>
    {
        let addr = self.object_addr(object)?;
        if self.version.large_objects {
            memory.get_u16(addr + large)
        } else {
            Ok(memory.get_byte(addr + small)? as u16)
        }
    }

    fn write_link(
        &self,
        memory: &mut MemoryBuffer,
        object: u16,
        small: usize,
        large: usize,
        target: u16,
    ) -> Result<(), VmFailure> {
        let addr = self.object_addr(object)?;
        if self.version.large_objects {
            memory.set_u16(addr + large, target)
        } else {
            if target > 255 {
                return Err(VmFailure::BadObject { number: target });
            }
            memory.set_byte(addr + small, target as u8)
        }
    }

    pub fn get_parent(&self, memory: &MemoryBuffer, object: u16) -> Result<u16, VmFailure> {
        self.read_link(memory, object, SMALL_PARENT, LARGE_PARENT)
    }

    pub fn get_sibling(&self, memory: &MemoryBuffer, object: u16) -> Result<u16, VmFailure> {
        self.read_link(memory, object, SMALL_SIBLING, LARGE_SIBLING)
    }

    pub fn get_child(&self, memory: &MemoryBuffer, object: u16) -> Result<u16, VmFailure> {
        self.read_link(memory, object, SMALL_CHILD, LARGE_CHILD)
    }

    /// Move `object` under `new_parent` (or detach it entirely when
    /// `new_parent` is 0), maintaining both sibling chains.
    pub fn set_parent(
        &self,
        memory: &mut MemoryBuffer,
        object: u16,
        new_parent: u16,
    ) -> Result<(), VmFailure> {
        let old_parent = self.get_parent(memory, object)?;
        if old_parent == new_parent {
            return Ok(());
        }
        trace!("moving object {} from {} to {}", object, old_parent, new_parent);

        // Unlink from the old parent's child chain.
        if old_parent != 0 {
            let first = self.get_child(memory, old_parent)?;
            if first == object {
                let next = self.get_sibling(memory, object)?;
                self.write_link(memory, old_parent, SMALL_CHILD, LARGE_CHILD, next)?;
            } else {
                let mut cursor = first;
                loop {
                    if cursor == 0 {
                        // The tree said we had a parent but the chain
                        // never reached us: the image is corrupt.
                        return Err(VmFailure::BadObject { number: object });
                    }
                    let next = self.get_sibling(memory, cursor)?;
                    if next == object {
                        let after = self.get_sibling(memory, object)?;
                        self.write_link(memory, cursor, SMALL_SIBLING, LARGE_SIBLING, after)?;
                        break;
                    }
                    cursor = next;
                }
            }
        }

        if new_parent == 0 {
            self.write_link(memory, object, SMALL_PARENT, LARGE_PARENT, 0)?;
            self.write_link(memory, object, SMALL_SIBLING, LARGE_SIBLING, 0)?;
        } else {
            let old_first = self.get_child(memory, new_parent)?;
            self.write_link(memory, object, SMALL_SIBLING, LARGE_SIBLING, old_first)?;
            self.write_link(memory, object, SMALL_PARENT, LARGE_PARENT, new_parent)?;
            self.write_link(memory, new_parent, SMALL_CHILD, LARGE_CHILD, object)?;
        }
        Ok(())
    }

    pub fn get_attribute(
        &self,
        memory: &MemoryBuffer,
        object: u16,
        attribute: u16,
    ) -> Result<bool, VmFailure> {
        let addr = self.object_addr(object)?;
        if attribute >= self.version.attribute_count {
            return Err(VmFailure::BadAttribute { number: attribute });
        }
        let byte = memory.get_byte(addr + attribute as usize / 8)?;
        let mask = 0x80 >> (attribute % 8);
        Ok(byte & mask != 0)
    }

    pub fn set_attribute(
        &self,
        memory: &mut MemoryBuffer,
        object: u16,
        attribute: u16,
        value: bool,
    ) -> Result<(), VmFailure> {
        let addr = self.object_addr(object)?;
        if attribute >= self.version.attribute_count {
            return Err(VmFailure::BadAttribute { number: attribute });
        }
        let pos = addr + attribute as usize / 8;
        let mask = 0x80 >> (attribute % 8);
        let byte = memory.get_byte(pos)?;
        let byte = if value { byte | mask } else { byte & !mask };
        memory.set_byte(pos, byte)
    }

    pub fn get_default_property(
        &self,
        memory: &MemoryBuffer,
        property: u8,
    ) -> Result<u16, VmFailure> {
        if property == 0 || property > self.version.max_properties {
            return Err(VmFailure::BadProperty {
                object: 0,
                number: property,
            });
        }
        memory.get_u16(self.defaults_addr + (property as usize - 1) * 2)
    }

    /// Address of the first property size byte, past the short name.
    fn first_property_addr(
        &self,
        memory: &MemoryBuffer,
        object: u16,
    ) -> Result<usize, VmFailure> {
        let addr = self.object_addr(object)?;
        let offset = if self.version.large_objects {
            LARGE_PROPERTIES
        } else {
            SMALL_PROPERTIES
        };
        let table = memory.get_u16(addr + offset)? as usize;
        let name_words = memory.get_byte(table)? as usize;
        Ok(table + 1 + name_words * 2)
    }

    /// Decode a property size byte (or pair). Returns the property
    /// number, the data length and the size-prefix length.
    fn property_info(
        &self,
        memory: &MemoryBuffer,
        size_addr: usize,
    ) -> Result<(u8, usize, usize), VmFailure> {
        let size_byte = memory.get_byte(size_addr)?;
        if !self.version.large_objects {
            // One byte: number in the low 5 bits, length-1 above them.
            let number = size_byte & 0x1F;
            let len = ((size_byte >> 5) & 0x07) as usize + 1;
            Ok((number, len, 1))
        } else if size_byte & 0x80 != 0 {
            // Two bytes: number in the low 6 bits, length in the second
            // byte's low 6 bits, 0 meaning 64.
            let number = size_byte & 0x3F;
            let raw = memory.get_byte(size_addr + 1)? & 0x3F;
            let len = if raw == 0 { 64 } else { raw as usize };
            Ok((number, len, 2))
        } else {
            let number = size_byte & 0x3F;
            let len = if size_byte & 0x40 != 0 { 2 } else { 1 };
            Ok((number, len, 1))
        }
    }

    /// Walk the descending property list for `property`. Returns its
    /// data address and length, or `None` when the object lacks it.
    fn find_property(
        &self,
        memory: &MemoryBuffer,
        object: u16,
        property: u8,
    ) -> Result<Option<(usize, usize)>, VmFailure> {
        let mut cursor = self.first_property_addr(memory, object)?;
        loop {
            let size_byte = memory.get_byte(cursor)?;
            if size_byte == 0 {
                return Ok(None);
            }
            let (number, len, prefix) = self.property_info(memory, cursor)?;
            if number == property {
                return Ok(Some((cursor + prefix, len)));
            }
            // Properties are stored in descending number order; walking
            // past the target means it is absent.
            if number < property {
                return Ok(None);
            }
            cursor += prefix + len;
        }
    }

    /// Address of a property's data, or 0 when the object lacks it.
    pub fn get_property_address(
        &self,
        memory: &MemoryBuffer,
        object: u16,
        property: u8,
    ) -> Result<usize, VmFailure> {
        Ok(self
            .find_property(memory, object, property)?
            .map(|(data, _)| data)
            .unwrap_or(0))
    }

    /// Data length for the property whose size prefix *begins* at
    /// `size_addr` (the first prefix byte, the one carrying the
    /// property number).
    pub fn property_length_at(
        &self,
        memory: &MemoryBuffer,
        size_addr: usize,
    ) -> Result<usize, VmFailure> {
        let (_, len, _) = self.property_info(memory, size_addr)?;
        Ok(len)
    }

    /// Data length for a property given its data address, the form
    /// `get_prop_addr` hands the story. The byte directly before the
    /// data is either the whole prefix or, in the large two-byte form,
    /// its second byte, which carries the top bit like the first.
    pub fn property_length_from_data(
        &self,
        memory: &MemoryBuffer,
        data_addr: usize,
    ) -> Result<usize, VmFailure> {
        if data_addr < 2 {
            return Err(VmFailure::MemoryOutOfRange { addr: data_addr });
        }
        let before = memory.get_byte(data_addr - 1)?;
        if self.version.large_objects && before & 0x80 != 0 {
            self.property_length_at(memory, data_addr - 2)
        } else {
            self.property_length_at(memory, data_addr - 1)
        }
    }

    /// Property value, falling back to the defaults table.
    pub fn get_property(
        &self,
        memory: &MemoryBuffer,
        object: u16,
        property: u8,
    ) -> Result<u16, VmFailure> {
        match self.find_property(memory, object, property)? {
            Some((data, 1)) => Ok(memory.get_byte(data)? as u16),
            Some((data, 2)) => memory.get_u16(data),
            Some(_) => Err(VmFailure::PropertyWrongSize),
            None => self.get_default_property(memory, property),
        }
    }

    /// First property number (argument 0), or the number following the
    /// given property.
    pub fn get_next_property(
        &self,
        memory: &MemoryBuffer,
        object: u16,
        property: u8,
    ) -> Result<u8, VmFailure> {
        let mut cursor = self.first_property_addr(memory, object)?;
        if property == 0 {
            let (number, _, _) = self.property_info(memory, cursor)?;
            return Ok(number);
        }
        loop {
            let size_byte = memory.get_byte(cursor)?;
            if size_byte == 0 {
                return Err(VmFailure::BadProperty {
                    object,
                    number: property,
                });
            }
            let (number, len, prefix) = self.property_info(memory, cursor)?;
            cursor += prefix + len;
            if number == property {
                let (next, _, _) = self.property_info(memory, cursor)?;
                return Ok(next);
            }
        }
    }

    pub fn put_property(
        &self,
        memory: &mut MemoryBuffer,
        object: u16,
        property: u8,
        value: u16,
    ) -> Result<(), VmFailure> {
        match self.find_property(memory, object, property)? {
            Some((data, 1)) => memory.set_byte(data, (value & 0xFF) as u8),
            Some((data, 2)) => memory.set_u16(data, value),
            Some(_) => Err(VmFailure::PropertyWrongSize),
            None => Err(VmFailure::BadProperty {
                object,
                number: property,
            }),
        }
    }

    /// The object's short name from its property header.
    pub fn short_name(
        &self,
        memory: &MemoryBuffer,
        codec: &TextCodec,
        object: u16,
    ) -> Result<String, VmFailure> {
        let addr = self.object_addr(object)?;
        let offset = if self.version.large_objects {
            LARGE_PROPERTIES
        } else {
            SMALL_PROPERTIES
        };
        let table = memory.get_u16(addr + offset)? as usize;
        let name_words = memory.get_byte(table)? as usize;
        if name_words == 0 {
            return Ok(String::new());
        }
        let (name, _) = codec.decode(memory, table + 1)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestStory;

    fn tree() -> (MemoryBuffer, ObjectTree) {
        let story = TestStory::v3();
        let memory = story.into_memory();
        let version = VersionSpec::new(&memory).unwrap();
        let tree = ObjectTree::new(&memory, version).unwrap();
        (memory, tree)
    }

    #[test]
    fn test_links_and_bounds() {
        let (memory, tree) = tree();
        // The fixture tree: 1 -> [2, 3], 4 empty.
        assert_eq!(tree.get_child(&memory, 1).unwrap(), 2);
        assert_eq!(tree.get_sibling(&memory, 2).unwrap(), 3);
        assert_eq!(tree.get_parent(&memory, 3).unwrap(), 1);
        assert_eq!(tree.get_child(&memory, 4).unwrap(), 0);
        assert!(matches!(
            tree.get_parent(&memory, 0),
            Err(VmFailure::BadObject { number: 0 })
        ));
    }

    #[test]
    fn test_insert_moves_between_parents() {
        let (mut memory, tree) = tree();
        tree.set_parent(&mut memory, 3, 4).unwrap();
        assert_eq!(tree.get_parent(&memory, 3).unwrap(), 4);
        assert_eq!(tree.get_child(&memory, 4).unwrap(), 3);
        assert_eq!(tree.get_sibling(&memory, 3).unwrap(), 0);
        // 1's chain no longer contains 3.
        assert_eq!(tree.get_child(&memory, 1).unwrap(), 2);
        assert_eq!(tree.get_sibling(&memory, 2).unwrap(), 0);
    }

    #[test]
    fn test_insert_prepends_to_chain() {
        let (mut memory, tree) = tree();
        tree.set_parent(&mut memory, 4, 1).unwrap();
        assert_eq!(tree.get_child(&memory, 1).unwrap(), 4);
        assert_eq!(tree.get_sibling(&memory, 4).unwrap(), 2);
        assert_eq!(tree.get_sibling(&memory, 2).unwrap(), 3);
    }

    #[test]
    fn test_detach_clears_links() {
        let (mut memory, tree) = tree();
        tree.set_parent(&mut memory, 2, 0).unwrap();
        assert_eq!(tree.get_parent(&memory, 2).unwrap(), 0);
        assert_eq!(tree.get_sibling(&memory, 2).unwrap(), 0);
        assert_eq!(tree.get_child(&memory, 1).unwrap(), 3);
    }

    #[test]
    fn test_reinsert_same_parent_is_noop() {
        let (mut memory, tree) = tree();
        tree.set_parent(&mut memory, 2, 1).unwrap();
        // Still first child, and no self-referential sibling loop.
        assert_eq!(tree.get_child(&memory, 1).unwrap(), 2);
        assert_eq!(tree.get_sibling(&memory, 2).unwrap(), 3);
    }

    #[test]
    fn test_attributes_big_endian_bits() {
        let (mut memory, tree) = tree();
        assert!(!tree.get_attribute(&memory, 1, 0).unwrap());
        tree.set_attribute(&mut memory, 1, 0, true).unwrap();
        // Attribute 0 is the top bit of the first record byte.
        let story = TestStory::v3();
        let addr = story.object_addr(1);
        assert_eq!(memory.get_byte(addr).unwrap(), 0x80);
        tree.set_attribute(&mut memory, 1, 9, true).unwrap();
        assert_eq!(memory.get_byte(addr + 1).unwrap(), 0x40);
        assert!(tree.get_attribute(&memory, 1, 9).unwrap());
        tree.set_attribute(&mut memory, 1, 9, false).unwrap();
        assert!(!tree.get_attribute(&memory, 1, 9).unwrap());
        assert!(tree.get_attribute(&memory, 1, 32).is_err());
    }

    #[test]
    fn test_property_walk() {
        let (memory, tree) = tree();
        // Object 1 carries property 17 (word 0xBEEF) and property 4
        // (byte 0x42), in descending order.
        assert_eq!(tree.get_property(&memory, 1, 17).unwrap(), 0xBEEF);
        assert_eq!(tree.get_property(&memory, 1, 4).unwrap(), 0x42);
        // Property 5 is absent: default table value.
        assert_eq!(tree.get_property(&memory, 1, 5).unwrap(), 0x1111);

        let addr = tree.get_property_address(&memory, 1, 17).unwrap();
        assert_ne!(addr, 0);
        assert_eq!(tree.property_length_at(&memory, addr - 1).unwrap(), 2);
        assert_eq!(tree.get_property_address(&memory, 1, 5).unwrap(), 0);

        assert_eq!(tree.get_next_property(&memory, 1, 0).unwrap(), 17);
        assert_eq!(tree.get_next_property(&memory, 1, 17).unwrap(), 4);
        assert_eq!(tree.get_next_property(&memory, 1, 4).unwrap(), 0);
    }

    #[test]
    fn test_put_property() {
        let (mut memory, tree) = tree();
        tree.put_property(&mut memory, 1, 4, 0x1234).unwrap();
        // One-byte property keeps only the low byte.
        assert_eq!(tree.get_property(&memory, 1, 4).unwrap(), 0x34);
        tree.put_property(&mut memory, 1, 17, 0xCAFE).unwrap();
        assert_eq!(tree.get_property(&memory, 1, 17).unwrap(), 0xCAFE);
        assert!(matches!(
            tree.put_property(&mut memory, 1, 5, 1),
            Err(VmFailure::BadProperty { object: 1, number: 5 })
        ));
    }

    #[test]
    fn test_short_name() {
        let story = TestStory::v3();
        let memory = story.into_memory();
        let version = VersionSpec::new(&memory).unwrap();
        let tree = ObjectTree::new(&memory, version).unwrap();
        let codec = TextCodec::new(&memory, version).unwrap();
        assert_eq!(tree.short_name(&memory, &codec, 1).unwrap(), "box");
    }

    fn large_tree() -> (MemoryBuffer, ObjectTree) {
        let story = TestStory::v5();
        let memory = story.into_memory();
        let version = VersionSpec::new(&memory).unwrap();
        let tree = ObjectTree::new(&memory, version).unwrap();
        (memory, tree)
    }

    #[test]
    fn test_large_records_and_links() {
        let (mut memory, tree) = large_tree();
        assert_eq!(tree.get_child(&memory, 1).unwrap(), 2);
        assert_eq!(tree.get_sibling(&memory, 2).unwrap(), 3);
        assert_eq!(tree.get_parent(&memory, 3).unwrap(), 1);

        tree.set_parent(&mut memory, 3, 4).unwrap();
        assert_eq!(tree.get_parent(&memory, 3).unwrap(), 4);
        assert_eq!(tree.get_child(&memory, 4).unwrap(), 3);
        assert_eq!(tree.get_sibling(&memory, 2).unwrap(), 0);
    }

    #[test]
    fn test_large_attribute_range() {
        let (mut memory, tree) = large_tree();
        tree.set_attribute(&mut memory, 1, 40, true).unwrap();
        assert!(tree.get_attribute(&memory, 1, 40).unwrap());
        // Attribute 40 is the top bit of record byte 5.
        let addr = TestStory::v5().object_addr(1);
        assert_eq!(memory.get_byte(addr + 5).unwrap(), 0x80);
        tree.set_attribute(&mut memory, 1, 47, true).unwrap();
        assert!(tree.get_attribute(&memory, 1, 47).unwrap());
        assert!(tree.get_attribute(&memory, 1, 48).is_err());
    }

    #[test]
    fn test_large_property_prefixes() {
        let (memory, tree) = large_tree();
        // Property 17 has a two-byte prefix and four data bytes.
        let data = tree.get_property_address(&memory, 1, 17).unwrap();
        assert_ne!(data, 0);
        assert_eq!(tree.property_length_at(&memory, data - 2).unwrap(), 4);
        assert_eq!(tree.property_length_from_data(&memory, data).unwrap(), 4);
        assert_eq!(memory.get_u16(data).unwrap(), 0xDEAD);

        // One-byte prefixes: bit 6 selects length 2.
        let data4 = tree.get_property_address(&memory, 1, 4).unwrap();
        assert_eq!(tree.property_length_from_data(&memory, data4).unwrap(), 2);
        assert_eq!(tree.get_property(&memory, 1, 4).unwrap(), 0xBEEF);
        let data3 = tree.get_property_address(&memory, 1, 3).unwrap();
        assert_eq!(tree.property_length_from_data(&memory, data3).unwrap(), 1);
        assert_eq!(tree.get_property(&memory, 1, 3).unwrap(), 0x42);

        // get_prop cannot read a 4-byte property; defaults still apply.
        assert_eq!(
            tree.get_property(&memory, 1, 17),
            Err(VmFailure::PropertyWrongSize)
        );
        assert_eq!(tree.get_property(&memory, 1, 5).unwrap(), 0x1111);

        assert_eq!(tree.get_next_property(&memory, 1, 0).unwrap(), 17);
        assert_eq!(tree.get_next_property(&memory, 1, 17).unwrap(), 4);
        assert_eq!(tree.get_next_property(&memory, 1, 4).unwrap(), 3);
        assert_eq!(tree.get_next_property(&memory, 1, 3).unwrap(), 0);
    }

    #[test]
    fn test_large_put_property() {
        let (mut memory, tree) = large_tree();
        tree.put_property(&mut memory, 1, 4, 0xCAFE).unwrap();
        assert_eq!(tree.get_property(&memory, 1, 4).unwrap(), 0xCAFE);
        tree.put_property(&mut memory, 1, 3, 0x1234).unwrap();
        assert_eq!(tree.get_property(&memory, 1, 3).unwrap(), 0x34);
        // A 4-byte property rejects put_prop.
        assert_eq!(
            tree.put_property(&mut memory, 1, 17, 1),
            Err(VmFailure::PropertyWrongSize)
        );
    }

    #[test]
    fn test_large_short_name() {
        let story = TestStory::v5();
        let memory = story.into_memory();
        let version = VersionSpec::new(&memory).unwrap();
        let tree = ObjectTree::new(&memory, version).unwrap();
        let codec = TextCodec::new(&memory, version).unwrap();
        assert_eq!(tree.short_name(&memory, &codec, 1).unwrap(), "box");
    }
}
