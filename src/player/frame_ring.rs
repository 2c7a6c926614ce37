use crate::core::VideoFrame;
use parking_lot::{Condvar, Mutex};

/// 视频帧环形队列
///
/// 固定槽位的环形缓冲区，head/tail/count 之外不暴露任何索引运算。
/// 解码线程 push（满时阻塞形成背压），渲染循环 try_pop（不阻塞，
/// 以免拖慢呈现节拍）。不变量: tail = (head + count) % capacity。
pub struct VideoFrameRing {
    inner: Mutex<RingInner>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

struct RingInner {
    slots: Vec<Option<VideoFrame>>,
    head: usize,
    count: usize,
    closed: bool,
}

impl VideoFrameRing {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(RingInner {
                slots,
                head: 0,
                count: 0,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// 入队一帧，槽位占满时阻塞等待渲染侧消费
    ///
    /// 环已关闭时返回 Err 并退还帧
    pub fn push(&self, frame: VideoFrame) -> std::result::Result<(), VideoFrame> {
        let mut inner = self.inner.lock();
        while inner.count == self.capacity && !inner.closed {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(frame);
        }
        let tail = (inner.head + inner.count) % self.capacity;
        inner.slots[tail] = Some(frame);
        inner.count += 1;
        self.not_empty.notify_one();
        Ok(())
    }

    /// 出队头部帧，环空时阻塞
    pub fn pop(&self) -> Option<VideoFrame> {
        let mut inner = self.inner.lock();
        loop {
            if inner.count > 0 {
                return Some(self.take_head(&mut inner));
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// 非阻塞出队，渲染循环专用
    pub fn try_pop(&self) -> Option<VideoFrame> {
        let mut inner = self.inner.lock();
        if inner.count == 0 {
            return None;
        }
        Some(self.take_head(&mut inner))
    }

    fn take_head(&self, inner: &mut RingInner) -> VideoFrame {
        let head = inner.head;
        let frame = inner.slots[head].take();
        inner.head = (head + 1) % self.capacity;
        inner.count -= 1;
        self.not_full.notify_one();
        // 槽位非空由 push/count 不变量保证
        frame.unwrap()
    }

    /// 关闭并唤醒两侧等待线程
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
