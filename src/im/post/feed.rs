//! 帖子流的分页累积状态
//!
//! 一次只允许一个页面在途；已加载的帖子按 ID 去重，保留首次出现的位置。

use crate::im::post::types::Post;
use crate::im::types::PageResponse;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PostFeed {
    posts: Vec<Post>,
    seen: HashSet<String>,
    next_page: u32,
    total_pages: Option<u32>,
    loading: bool,
}

impl Default for PostFeed {
    fn default() -> Self {
        Self {
            posts: Vec::new(),
            seen: HashSet::new(),
            next_page: 1,
            total_pages: None,
            loading: false,
        }
    }
}

impl PostFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// 是否还有未加载的页；总页数未知时视为还有
    pub fn has_more(&self) -> bool {
        self.total_pages.map_or(true, |total| self.next_page <= total)
    }

    /// 下一页页码；已到末尾或有请求在途时返回 None
    pub fn next_page(&self) -> Option<u32> {
        if self.loading || !self.has_more() {
            return None;
        }
        Some(self.next_page)
    }

    /// 标记开始加载，返回需要请求的页码
    pub fn begin_load(&mut self) -> Option<u32> {
        let page = self.next_page()?;
        self.loading = true;
        Some(page)
    }

    pub fn fail_load(&mut self) {
        self.loading = false;
    }

    /// 应用一页结果，返回新增的帖子数
    pub fn apply_page(&mut self, page: PageResponse<Post>) -> usize {
        let requested = self.next_page;
        let before = self.posts.len();
        for post in page.data {
            if self.seen.insert(post.id.clone()) {
                self.posts.push(post);
            }
        }
        self.total_pages = Some(page.total_pages);
        let current = if page.current_page == 0 {
            requested
        } else {
            page.current_page
        };
        self.next_page = current.max(requested) + 1;
        self.loading = false;

        let added = self.posts.len() - before;
        debug!(
            "[PostFeed] 第 {} 页加入 {} 条，共 {} 条，总页数 {}",
            current,
            added,
            self.posts.len(),
            page.total_pages
        );
        added
    }

    /// 新发的帖子放在最前面
    pub fn prepend(&mut self, post: Post) {
        if self.seen.insert(post.id.clone()) {
            self.posts.insert(0, post);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
