//! Typed upload buffer
//!
//! A `BufferMemoryPool<T>` is one mapped upload buffer holding `capacity`
//! elements of `T`. Constant buffers pad every element to 256 bytes so each
//! one can be bound on its own.

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::gpu::{BufferAllocation, BufferId, GpuAddress, GpuDevice, GpuError, GpuResult};

/// Required placement of individual constant buffer views
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Round `byte_size` up to the constant buffer alignment
pub const fn constant_buffer_byte_size(byte_size: u64) -> u64 {
    (byte_size + (CONSTANT_BUFFER_ALIGNMENT - 1)) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

/// Resizable typed upload buffer
#[derive(Debug)]
pub struct BufferMemoryPool<T: Pod> {
    allocation: Option<BufferAllocation>,
    capacity: usize,
    element_byte_size: u64,
    is_constant_buffer: bool,
    _marker: PhantomData<T>,
}

impl<T: Pod> BufferMemoryPool<T> {
    /// Allocate room for `capacity` elements (at least one)
    pub fn new<D: GpuDevice + ?Sized>(device: &mut D, capacity: usize, is_constant_buffer: bool) -> GpuResult<Self> {
        let capacity = capacity.max(1);
        let raw_size = std::mem::size_of::<T>() as u64;
        let element_byte_size = if is_constant_buffer {
            constant_buffer_byte_size(raw_size)
        } else {
            raw_size
        };

        let allocation = device.create_upload_buffer(element_byte_size * capacity as u64)?;
        log::debug!(
            "Allocated {} pool: {} x {} bytes at {}",
            std::any::type_name::<T>(),
            capacity,
            element_byte_size,
            allocation.gpu_address
        );

        Ok(Self {
            allocation: Some(allocation),
            capacity,
            element_byte_size,
            is_constant_buffer,
            _marker: PhantomData,
        })
    }

    /// Copy one element into mapped memory
    pub fn copy_data<D: GpuDevice + ?Sized>(&self, device: &mut D, index: usize, data: &T) -> GpuResult<()> {
        if index >= self.capacity {
            return Err(GpuError::InvalidOperation {
                reason: format!("element {index} out of range for pool of {}", self.capacity),
            });
        }

        let Some(allocation) = self.allocation else {
            return Err(GpuError::InvalidOperation {
                reason: "copy into a pool whose buffer failed to allocate".to_string(),
            });
        };

        let offset = index as u64 * self.element_byte_size;
        device.write_buffer(allocation.id, offset, bytemuck::bytes_of(data))
    }

    /// GPU address of element `index`; null once a resize has failed
    pub fn gpu_address(&self, index: usize) -> GpuAddress {
        self.base_address().offset(index as u64 * self.element_byte_size)
    }

    /// Address of the first element
    pub fn base_address(&self) -> GpuAddress {
        self.allocation.map_or(GpuAddress::NULL, |allocation| allocation.gpu_address)
    }

    /// Underlying buffer, if one is allocated
    pub fn buffer_id(&self) -> Option<BufferId> {
        self.allocation.map(|allocation| allocation.id)
    }

    /// Number of elements
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stride between elements in bytes
    pub fn element_byte_size(&self) -> u64 {
        self.element_byte_size
    }

    /// Whether elements are padded for constant buffer binding
    pub fn is_constant_buffer(&self) -> bool {
        self.is_constant_buffer
    }

    /// Destroy the buffer and allocate a new one with `new_capacity` elements
    ///
    /// Contents are discarded and every previously returned address becomes
    /// invalid. On failure the pool holds no buffer and reports zero capacity.
    pub fn resize<D: GpuDevice + ?Sized>(&mut self, device: &mut D, new_capacity: usize) -> GpuResult<()> {
        let new_capacity = new_capacity.max(1);
        let old_address = self.base_address();
        if let Some(old) = self.allocation.take() {
            device.destroy_buffer(old.id);
        }

        match device.create_upload_buffer(self.element_byte_size * new_capacity as u64) {
            Ok(allocation) => {
                log::debug!(
                    "Resized {} pool: {} -> {} elements, {} -> {}",
                    std::any::type_name::<T>(),
                    self.capacity,
                    new_capacity,
                    old_address,
                    allocation.gpu_address
                );
                self.allocation = Some(allocation);
                self.capacity = new_capacity;
                Ok(())
            }
            Err(err) => {
                self.capacity = 0;
                Err(err)
            }
        }
    }

    /// Free the buffer
    pub fn release<D: GpuDevice + ?Sized>(self, device: &mut D) {
        if let Some(allocation) = self.allocation {
            device.destroy_buffer(allocation.id);
        }
    }
}
