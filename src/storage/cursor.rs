//! A cursor is a transient position within a table's leaf chain. It borrows
//! the table for its lifetime and owns no I/O resources of its own.

use crate::errors::Error;
use crate::storage::btree::NodeType;
use crate::storage::table::Table;

pub struct Cursor<'a> {
    pub table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: usize,
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Positions at the first row (or past-the-end of an empty tree).
    pub fn table_start(table: &'a mut Table) -> Result<Self, Error> {
        let root = table.root_page_num;
        let mut cursor = Self::table_find(table, root, 0)?;
        let num_cells = cursor.table.pager.get(cursor.page_num)?.leaf_node_num_cells();
        cursor.end_of_table = num_cells == 0;
        Ok(cursor)
    }

    pub fn table_end(table: &'a mut Table) -> Result<Self, Error> {
        let root = table.root_page_num;
        let mut page_num = root;
        loop {
            let node = table.pager.get(page_num)?;
            match node.get_node_type() {
                NodeType::Leaf => break,
                NodeType::Internal => {
                    page_num = node.internal_node_right_child();
                }
            }
        }
        let cell_num = table.pager.get(page_num)?.leaf_node_num_cells() as usize;
        Ok(Cursor {
            table,
            page_num,
            cell_num,
            end_of_table: true,
        })
    }

    /// Descends from `page_num` to the leaf that should contain `key`,
    /// binary-searching each internal node's `(child, max_key)` array.
    pub fn table_find(table: &'a mut Table, page_num: u32, key: u32) -> Result<Self, Error> {
        let mut current = page_num;
        loop {
            let node_type = table.pager.get(current)?.get_node_type();
            match node_type {
                NodeType::Leaf => {
                    let cell_num = leaf_node_find_cell(table, current, key)?;
                    return Ok(Cursor {
                        table,
                        page_num: current,
                        cell_num,
                        end_of_table: false,
                    });
                }
                NodeType::Internal => {
                    let child_num = internal_node_find_child(table, current, key)?;
                    current = table.pager.get(current)?.internal_node_child(child_num)?;
                }
            }
        }
    }

    pub fn value(&mut self) -> Result<&[u8], Error> {
        let node = self.table.pager.get(self.page_num)?;
        node.leaf_node_value(self.cell_num)
    }

    pub fn value_mut(&mut self) -> Result<&mut [u8], Error> {
        let node = self.table.pager.get_mut(self.page_num)?;
        node.leaf_node_value_mut(self.cell_num)
    }

    /// Advances one cell, following the leaf chain when a leaf is exhausted.
    pub fn advance(&mut self) -> Result<(), Error> {
        let node = self.table.pager.get(self.page_num)?;
        let num_cells = node.leaf_node_num_cells() as usize;
        self.cell_num += 1;
        if self.cell_num >= num_cells {
            let next = node.leaf_node_next_leaf();
            if next == 0 {
                self.end_of_table = true;
            } else {
                self.page_num = next;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}

fn leaf_node_find_cell(table: &mut Table, page_num: u32, key: u32) -> Result<usize, Error> {
    let node = table.pager.get(page_num)?;
    let num_cells = node.leaf_node_num_cells() as usize;
    let mut lo = 0usize;
    let mut hi = num_cells;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let mid_key = node.leaf_node_key(mid)?;
        if mid_key == key {
            return Ok(mid);
        } else if key < mid_key {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Ok(lo)
}

fn internal_node_find_child(table: &mut Table, page_num: u32, key: u32) -> Result<usize, Error> {
    let node = table.pager.get(page_num)?;
    let num_keys = node.internal_node_num_keys() as usize;
    let mut lo = 0usize;
    let mut hi = num_keys;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let mid_key = node.internal_node_key(mid);
        if key <= mid_key {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Ok(lo)
}
