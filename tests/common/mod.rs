//! Instantiates generic test cases once per poller backend on this host.

macro_rules! for_each_poller {
    ($($case:ident),+ $(,)?) => {
        $(
            mod $case {
                #[test]
                fn select() {
                    super::$case::<evio::SelectPoller>();
                }

                #[test]
                fn poll() {
                    super::$case::<evio::PollPoller>();
                }

                #[cfg(target_os = "linux")]
                #[test]
                fn epoll() {
                    super::$case::<evio::EpollPoller>();
                }
            }
        )+
    };
}

pub(crate) use for_each_poller;
