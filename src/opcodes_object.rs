//! Object-tree opcodes: hierarchy links, attributes and properties.

use log::debug;

use crate::error::VmFailure;
use crate::processor::{three, Processor};
use crate::ui::ZMachineUi;

impl<U: ZMachineUi> Processor<U> {
    /// 2OP:0x06 jin — branch if `a` is a direct child of `b`.
    pub(crate) fn op_jin(&mut self, a: u16, b: u16) -> Result<(), VmFailure> {
        let parent = self.objects.get_parent(&self.memory, a)?;
        self.branch(parent == b)
    }

    /// 2OP:0x0A test_attr
    pub(crate) fn op_test_attr(&mut self, object: u16, attribute: u16) -> Result<(), VmFailure> {
        let set = self.objects.get_attribute(&self.memory, object, attribute)?;
        self.branch(set)
    }

    /// 2OP:0x0B set_attr
    pub(crate) fn op_set_attr(&mut self, object: u16, attribute: u16) -> Result<(), VmFailure> {
        self.objects
            .set_attribute(&mut self.memory, object, attribute, true)
    }

    /// 2OP:0x0C clear_attr
    pub(crate) fn op_clear_attr(&mut self, object: u16, attribute: u16) -> Result<(), VmFailure> {
        self.objects
            .set_attribute(&mut self.memory, object, attribute, false)
    }

    /// 2OP:0x0E insert_obj — make `object` the first child of `dest`.
    pub(crate) fn op_insert_obj(&mut self, object: u16, dest: u16) -> Result<(), VmFailure> {
        debug!("insert_obj {} into {}", object, dest);
        self.objects.set_parent(&mut self.memory, object, dest)
    }

    /// 1OP:0x09 remove_obj — detach `object` from the tree.
    pub(crate) fn op_remove_obj(&mut self, object: u16) -> Result<(), VmFailure> {
        self.objects.set_parent(&mut self.memory, object, 0)
    }

    /// 1OP:0x03 get_parent — store only, no branch.
    pub(crate) fn op_get_parent(&mut self, object: u16) -> Result<(), VmFailure> {
        let parent = self.objects.get_parent(&self.memory, object)?;
        self.store(parent)
    }

    /// 1OP:0x01 get_sibling — store, then branch if nonzero.
    pub(crate) fn op_get_sibling(&mut self, object: u16) -> Result<(), VmFailure> {
        let sibling = self.objects.get_sibling(&self.memory, object)?;
        self.store(sibling)?;
        self.branch(sibling != 0)
    }

    /// 1OP:0x02 get_child — store, then branch if nonzero.
    pub(crate) fn op_get_child(&mut self, object: u16) -> Result<(), VmFailure> {
        let child = self.objects.get_child(&self.memory, object)?;
        self.store(child)?;
        self.branch(child != 0)
    }

    /// 2OP:0x11 get_prop — property value or its default.
    pub(crate) fn op_get_prop(&mut self, object: u16, property: u16) -> Result<(), VmFailure> {
        let value = self
            .objects
            .get_property(&self.memory, object, property as u8)?;
        self.store(value)
    }

    /// 2OP:0x12 get_prop_addr — data address, 0 when absent.
    pub(crate) fn op_get_prop_addr(&mut self, object: u16, property: u16) -> Result<(), VmFailure> {
        let addr = self
            .objects
            .get_property_address(&self.memory, object, property as u8)?;
        self.store(addr as u16)
    }

    /// 2OP:0x13 get_next_prop
    pub(crate) fn op_get_next_prop(&mut self, object: u16, property: u16) -> Result<(), VmFailure> {
        let next = self
            .objects
            .get_next_property(&self.memory, object, property as u8)?;
        self.store(next as u16)
    }

    /// 1OP:0x04 get_prop_len — length for a property data address as
    /// produced by get_prop_addr; 0 yields 0.
    pub(crate) fn op_get_prop_len(&mut self, data_addr: u16) -> Result<(), VmFailure> {
        let len = if data_addr == 0 {
            0
        } else {
            self.objects
                .property_length_from_data(&self.memory, data_addr as usize)?
        };
        self.store(len as u16)
    }

    /// VAR:0x03 put_prop
    pub(crate) fn op_put_prop(&mut self, operands: &[u16], op: u8) -> Result<(), VmFailure> {
        let (object, property, value) = three(op, operands)?;
        self.objects
            .put_property(&mut self.memory, object, property as u8, value)
    }

    /// 1OP:0x0A print_obj — the object's short name.
    pub(crate) fn op_print_obj(&mut self, object: u16) -> Result<(), VmFailure> {
        let name = self.objects.short_name(&self.memory, &self.text, object)?;
        self.ui.print_string(&name)?;
        Ok(())
    }
}
