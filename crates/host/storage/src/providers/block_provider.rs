//! Provider for L1 block references and their canonical status.
use crate::{
    StorageError,
    models::{BlockKey, L1BlockNumbers, L1Blocks, NumberRef, StoredBlock},
};
use alloy_primitives::B256;
use conclave_protocol::{L1BlockInfo, QueryPagination};
use reth_db_api::{
    cursor::DbCursorRO,
    transaction::{DbTx, DbTxMut},
};
use tracing::{debug, error};

/// An L1 block storage that wraps transactional reference.
pub(crate) struct BlockProvider<'tx, TX> {
    tx: &'tx TX,
}

impl<'tx, TX> BlockProvider<'tx, TX> {
    pub(crate) const fn new(tx: &'tx TX) -> Self {
        Self { tx }
    }
}

impl<TX> BlockProvider<'_, TX>
where
    TX: DbTx,
{
    pub(crate) fn find_block(&self, hash: B256) -> Result<Option<StoredBlock>, StorageError> {
        let Some(number) = self.tx.get::<L1BlockNumbers>(hash)? else {
            return Ok(None);
        };
        let block = self.tx.get::<L1Blocks>(BlockKey::new(number.number, hash)).inspect_err(
            |err| error!(target: "host_storage", %hash, %err, "Failed to read L1 block"),
        )?;
        Ok(block)
    }

    pub(crate) fn get_block(&self, hash: B256) -> Result<L1BlockInfo, StorageError> {
        self.find_block(hash)?
            .map(|stored| stored.block)
            .ok_or_else(|| StorageError::EntryNotFound(format!("L1 block {hash}")))
    }

    pub(crate) fn blocks_at_height(&self, number: u64) -> Result<Vec<StoredBlock>, StorageError> {
        let mut cursor = self.tx.cursor_read::<L1Blocks>()?;
        let walker = cursor.walk_range(
            BlockKey::new(number, B256::ZERO)..=BlockKey::new(number, B256::repeat_byte(0xff)),
        )?;
        let blocks = walker.map(|entry| entry.map(|(_, block)| block)).collect::<Result<_, _>>();
        Ok(blocks?)
    }

    pub(crate) fn get_canonical_block_at_height(
        &self,
        number: u64,
    ) -> Result<L1BlockInfo, StorageError> {
        self.blocks_at_height(number)?
            .into_iter()
            .find(|stored| stored.is_canonical)
            .map(|stored| stored.block)
            .ok_or_else(|| {
                StorageError::EntryNotFound(format!("canonical L1 block at height {number}"))
            })
    }

    /// Returns the highest canonical block.
    pub(crate) fn get_head_block(&self) -> Result<L1BlockInfo, StorageError> {
        let mut cursor = self.tx.cursor_read::<L1Blocks>()?;
        for entry in cursor.walk_back(None)? {
            let (_, stored) = entry?;
            if stored.is_canonical {
                return Ok(stored.block);
            }
        }
        Err(StorageError::EntryNotFound("no canonical L1 block".to_string()))
    }

    /// Lists canonical blocks newest first, ordered by height.
    pub(crate) fn list_blocks(
        &self,
        pagination: &QueryPagination,
    ) -> Result<Vec<L1BlockInfo>, StorageError> {
        pagination.validate()?;
        let offset = usize::try_from(pagination.offset).unwrap_or(usize::MAX);

        let mut cursor = self.tx.cursor_read::<L1Blocks>()?;
        let mut blocks = Vec::with_capacity(pagination.size as usize);
        let canonical = cursor
            .walk_back(None)?
            .filter(|entry| !matches!(entry, Ok((_, stored)) if !stored.is_canonical));
        for entry in canonical.skip(offset).take(pagination.size as usize) {
            let (_, stored) = entry?;
            blocks.push(stored.block);
        }
        Ok(blocks)
    }

    /// Checks that `block` is the only canonical block at its height and that its parent, if
    /// stored, is canonical too.
    pub(crate) fn validate_canonical(&self, block: &L1BlockInfo) -> Result<(), StorageError> {
        let canonical_at_height = self
            .blocks_at_height(block.number)?
            .iter()
            .filter(|stored| stored.is_canonical)
            .count();
        if canonical_at_height > 1 {
            return Err(StorageError::ConflictError(format!(
                "{canonical_at_height} canonical L1 blocks at height {}",
                block.number
            )));
        }

        if block.number == 0 {
            return Ok(());
        }
        match self.find_block(block.parent_hash)? {
            Some(parent) if !parent.is_canonical => Err(StorageError::ConflictError(format!(
                "canonical L1 block {} extends non-canonical parent {}",
                block.hash, block.parent_hash
            ))),
            _ => Ok(()),
        }
    }

    /// Checks that no canonical block still extends `block` once it is no longer canonical.
    pub(crate) fn validate_demoted(&self, block: &L1BlockInfo) -> Result<(), StorageError> {
        let Some(child_height) = block.number.checked_add(1) else {
            return Ok(());
        };
        let orphaned = self
            .blocks_at_height(child_height)?
            .into_iter()
            .find(|stored| stored.is_canonical && stored.block.parent_hash == block.hash);
        match orphaned {
            Some(child) => Err(StorageError::ConflictError(format!(
                "canonical L1 block {} extends non-canonical parent {}",
                child.block.hash, block.hash
            ))),
            None => Ok(()),
        }
    }
}

impl<TX> BlockProvider<'_, TX>
where
    TX: DbTxMut + DbTx,
{
    pub(crate) fn add_block(&self, block: &L1BlockInfo) -> Result<(), StorageError> {
        if self.tx.get::<L1BlockNumbers>(block.hash)?.is_some() {
            return Err(StorageError::EntryAlreadyExists(format!("L1 block {}", block.hash)));
        }

        let stored = StoredBlock { block: *block, is_canonical: true };
        self.tx.put::<L1Blocks>(BlockKey::from(block), stored).inspect_err(|err| {
            error!(target: "host_storage", hash = %block.hash, %err, "Failed to store L1 block");
        })?;
        self.tx.put::<L1BlockNumbers>(block.hash, NumberRef { number: block.number })?;

        debug!(
            target: "host_storage",
            hash = %block.hash,
            number = block.number,
            "Stored L1 block"
        );
        Ok(())
    }

    /// Sets the canonical flag of a stored block, returning the block if it is known.
    pub(crate) fn set_canonical(
        &self,
        hash: B256,
        is_canonical: bool,
    ) -> Result<Option<L1BlockInfo>, StorageError> {
        let Some(mut stored) = self.find_block(hash)? else {
            return Ok(None);
        };
        let block = stored.block;
        if stored.is_canonical != is_canonical {
            stored.is_canonical = is_canonical;
            self.tx.put::<L1Blocks>(BlockKey::from(&block), stored)?;
        }
        Ok(Some(block))
    }
}
